//! Query-level tests against an in-memory database.

use chrono::{NaiveDate, Utc};
use circle_db::users::{NewUser, UserFilter, UserUpdate};
use circle_db::{AffirmationRow, Database, is_unique_violation};
use circle_types::{LogStatus, Role};
use uuid::Uuid;

const ROOT: &str = "root@circle.test";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn affirmation(db: &Database, id: &str) -> AffirmationRow {
    db.list_affirmations(false)
        .unwrap()
        .into_iter()
        .find(|a| a.id == id)
        .unwrap()
}

fn add_user(db: &Database, name: &str, email: &str, role: Role) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_user(&NewUser {
        id: &id,
        name,
        email,
        password_hash: "hash",
        role,
        joined_at: Utc::now(),
    })
    .unwrap();
    id
}

#[test]
fn second_log_for_same_day_is_a_unique_violation() {
    let db = Database::open_in_memory().unwrap();
    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);

    let first = db
        .insert_log("log-1", &uid, day(2024, 3, 1), LogStatus::Done, Some(Utc::now()))
        .unwrap();
    let err = db
        .insert_log("log-2", &uid, day(2024, 3, 1), LogStatus::Done, Some(Utc::now()))
        .unwrap_err();

    assert!(is_unique_violation(&err));
    let stored = db.get_log(&uid, day(2024, 3, 1)).unwrap().unwrap();
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.status, LogStatus::Done);
}

#[test]
fn upsert_log_rewrites_existing_day() {
    let db = Database::open_in_memory().unwrap();
    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);

    db.insert_log("log-1", &uid, day(2024, 3, 1), LogStatus::Done, Some(Utc::now()))
        .unwrap();
    db.upsert_log("log-x", &uid, day(2024, 3, 1), LogStatus::Missed, None)
        .unwrap();
    db.upsert_log("log-y", &uid, day(2024, 3, 2), LogStatus::Done, None)
        .unwrap();

    let logs = db.logs_for_user(&uid).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].day, day(2024, 3, 2));
    assert_eq!(logs[1].status, LogStatus::Missed);
    assert_eq!(logs[1].id, "log-1");
}

#[test]
fn logs_between_is_inclusive_and_ascending() {
    let db = Database::open_in_memory().unwrap();
    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    for d in [31, 1, 15, 29] {
        let date = if d == 31 { day(2024, 1, 31) } else { day(2024, 2, d) };
        db.insert_log(&Uuid::new_v4().to_string(), &uid, date, LogStatus::Done, None)
            .unwrap();
    }
    db.insert_log(&Uuid::new_v4().to_string(), &uid, day(2024, 3, 1), LogStatus::Done, None)
        .unwrap();

    let feb = db.logs_between(&uid, day(2024, 2, 1), day(2024, 2, 29)).unwrap();
    let days: Vec<u32> = feb.iter().map(|l| chrono::Datelike::day(&l.day)).collect();
    assert_eq!(days, vec![1, 15, 29]);
}

#[test]
fn swap_exchanges_only_the_two_orders() {
    let db = Database::open_in_memory().unwrap();
    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    let a = db.insert_affirmation("a", "First", None, &uid).unwrap();
    let b = db.insert_affirmation("b", "Second", None, &uid).unwrap();
    let c = db.insert_affirmation("c", "Third", None, &uid).unwrap();
    assert_eq!((a.sort_order, b.sort_order, c.sort_order), (1, 2, 3));

    let (a2, c2) = db.swap_affirmation_order("a", "c").unwrap().unwrap();
    assert_eq!(a2.sort_order, 3);
    assert_eq!(c2.sort_order, 1);
    assert_eq!(affirmation(&db, "b").sort_order, 2);

    assert!(db.swap_affirmation_order("a", "missing").unwrap().is_none());
    assert_eq!(affirmation(&db, "a").sort_order, 3);
}

#[test]
fn seeding_happens_only_into_an_empty_store() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.seed_affirmations(&["One", "Two"], None).unwrap());
    assert!(!db.seed_affirmations(&["Three"], None).unwrap());

    let all = db.list_affirmations(false).unwrap();
    let texts: Vec<&str> = all.iter().map(|a| a.text.as_str()).collect();
    assert_eq!(texts, vec!["One", "Two"]);

    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    let appended = db.insert_affirmation("c", "Three", None, &uid).unwrap();
    assert_eq!(appended.sort_order, 3);
}

#[test]
fn inactive_affirmations_are_hidden_from_active_listing() {
    let db = Database::open_in_memory().unwrap();
    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    db.insert_affirmation("a", "Kept", None, &uid).unwrap();
    db.insert_affirmation("b", "Hidden", None, &uid).unwrap();
    db.update_affirmation(
        "b",
        &circle_db::affirmations::AffirmationUpdate {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .unwrap()
    .unwrap();

    assert_eq!(db.list_affirmations(true).unwrap().len(), 1);
    assert_eq!(db.list_affirmations(false).unwrap().len(), 2);
}

#[test]
fn listing_and_counts_exclude_the_hidden_email() {
    let db = Database::open_in_memory().unwrap();
    add_user(&db, "Root", ROOT, Role::Admin);
    let ana = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    add_user(&db, "Ben", "ben@circle.test", Role::User);
    db.set_user_active(&ana, false).unwrap();

    let (users, total) = db
        .list_users(&UserFilter {
            exclude_email: Some(ROOT),
            limit: 20,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total, 2);
    assert!(users.iter().all(|u| u.email != ROOT));

    let (admins, total) = db
        .list_users(&UserFilter {
            exclude_email: Some(ROOT),
            role: Some(Role::Admin),
            limit: 20,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(admins[0].name, "Ana");

    let (found, _) = db
        .list_users(&UserFilter {
            exclude_email: Some(ROOT),
            search: Some("RO"),
            limit: 20,
            ..Default::default()
        })
        .unwrap();
    assert!(found.is_empty());

    let counts = db.user_counts(Some(ROOT)).unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.admins, 1);
    assert_eq!(counts.active, 1);
    assert_eq!(counts.blocked, 1);
    assert_eq!(db.count_active_users(Some(ROOT)).unwrap(), 1);
    assert_eq!(db.count_active_users(None).unwrap(), 2);
}

#[test]
fn overridden_streaks_are_not_overwritten_by_cache() {
    let db = Database::open_in_memory().unwrap();
    let uid = add_user(&db, "Ana", "ana@circle.test", Role::Admin);

    db.cache_streaks(&uid, 2, 5).unwrap();
    db.override_streaks(&uid, Some(40), None).unwrap();
    db.cache_streaks(&uid, 1, 1).unwrap();

    let user = db.get_user_by_id(&uid).unwrap().unwrap();
    assert!(user.streak_overridden);
    assert_eq!((user.current_streak, user.longest_streak), (40, 5));

    db.clear_streak_override(&uid).unwrap();
    db.cache_streaks(&uid, 1, 1).unwrap();
    let user = db.get_user_by_id(&uid).unwrap().unwrap();
    assert_eq!((user.current_streak, user.longest_streak), (1, 1));
}

#[test]
fn reminder_recipients_and_token_cleanup() {
    let db = Database::open_in_memory().unwrap();
    let ana = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    let ben = add_user(&db, "Ben", "ben@circle.test", Role::User);
    let cy = add_user(&db, "Cy", "cy@circle.test", Role::User);
    let dee = add_user(&db, "Dee", "dee@circle.test", Role::User);
    db.set_push_token(&ana, Some("tok-ana")).unwrap();
    db.set_push_token(&ben, Some("tok-ben")).unwrap();
    db.set_push_token(&cy, Some("tok-cy")).unwrap();
    db.set_reminder_enabled(&ben, false).unwrap();
    db.set_push_token(&dee, Some("tok-dee")).unwrap();
    db.set_user_active(&dee, false).unwrap();

    let tokens: Vec<String> = db.reminder_recipients().unwrap().into_iter().map(|r| r.token).collect();
    assert_eq!(tokens, vec!["tok-ana".to_string(), "tok-cy".to_string()]);

    let removed = db.clear_push_tokens(&["tok-cy".to_string(), "tok-unknown".to_string()]).unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_user_by_id(&cy).unwrap().unwrap().push_token.is_none());
}

#[test]
fn deleting_a_user_cascades_to_logs_and_roster() {
    let db = Database::open_in_memory().unwrap();
    let ana = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    let ben = add_user(&db, "Ben", "ben@circle.test", Role::User);
    db.get_or_create_group("Welcome", &ana).unwrap();
    db.add_group_member(&ben).unwrap();
    db.insert_log("l1", &ben, day(2024, 1, 1), LogStatus::Done, None).unwrap();
    db.insert_affirmation("a", "Mine", None, &ben).unwrap();

    assert!(db.delete_user(&ben).unwrap());
    assert_eq!(db.count_logs(None).unwrap(), 0);
    assert_eq!(db.list_group_members(None).unwrap().len(), 1);
    assert!(affirmation(&db, "a").created_by.is_none());
    assert!(!db.delete_user(&ben).unwrap());
}

#[test]
fn group_is_created_once_and_message_updates() {
    let db = Database::open_in_memory().unwrap();
    let ana = add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    let ben = add_user(&db, "Ben", "ben@circle.test", Role::Admin);

    let g = db.get_or_create_group("Welcome", &ana).unwrap();
    assert_eq!(g.message, "Welcome");
    assert_eq!(g.created_by_name.as_deref(), Some("Ana"));

    let again = db.get_or_create_group("Other", &ben).unwrap();
    assert_eq!(again.message, "Welcome");
    assert_eq!(again.created_by.as_deref(), Some(ana.as_str()));

    let updated = db.update_group_message("New words", &ben).unwrap();
    assert_eq!(updated.message, "New words");
    assert_eq!(updated.created_by.as_deref(), Some(ana.as_str()));
}

#[test]
fn duplicate_email_is_a_unique_violation() {
    let db = Database::open_in_memory().unwrap();
    add_user(&db, "Ana", "ana@circle.test", Role::Admin);
    let err = db
        .create_user(&NewUser {
            id: "other",
            name: "Ana Two",
            email: "ana@circle.test",
            password_hash: "hash",
            role: Role::User,
            joined_at: Utc::now(),
        })
        .unwrap_err();
    assert!(is_unique_violation(&err));

    let ben = add_user(&db, "Ben", "ben@circle.test", Role::User);
    let err = db
        .update_user(
            &ben,
            &UserUpdate {
                email: Some("ana@circle.test".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(is_unique_violation(&err));
}
