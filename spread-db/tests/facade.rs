// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Query building through the read and write facades.

use proptest::prelude::*;
use spread_db::prelude::*;
use spread_db_test_utils::{City, TestDatabase, User, arb_chain, dry_run, users};

/// Compile `facade`'s chain as a dry-run `find` and return the SQL and vars.
fn compiled<H: ReadOnly>(facade: &H) -> (String, Vec<Value>) {
    let mut out: Vec<User> = Vec::new();
    let ran = facade
        .session(SessionConfig {
            dry_run: true,
            ..Default::default()
        })
        .find(&mut out);
    (ran.statement().sql().to_owned(), ran.statement().vars().to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_chaining_never_mutates_the_receiver(
        base_ops in arb_chain(4),
        branch_a in arb_chain(4),
        branch_b in arb_chain(4),
    ) {
        let db = TestDatabase::new();
        let read = db.provider().read;
        let base = base_ops.iter().fold(read, |facade, op| op.apply(&facade));
        let before = compiled(&base);

        let a = branch_a.iter().fold(base.clone(), |facade, op| op.apply(&facade));
        let b = branch_b.iter().fold(base.clone(), |facade, op| op.apply(&facade));
        prop_assert_eq!(compiled(&base), before);

        // Deriving the same chain twice compiles the same statement
        let a_again = branch_a.iter().fold(base.clone(), |facade, op| op.apply(&facade));
        prop_assert_eq!(compiled(&a), compiled(&a_again));
        if branch_a == branch_b {
            prop_assert_eq!(compiled(&a), compiled(&b));
        }
    }
}

#[test_log::test]
fn test_scopes_match_manual_chaining() {
    let db = TestDatabase::new();
    let provider = db.provider();
    provider
        .write
        .create_in_batches(&mut users(6), 0)
        .result()
        .unwrap();

    let adults = |facade: ReadDb| facade.filter(expr!("age >= ?", 22));
    let oldest_first = |facade: ReadDb| facade.order(OrderBy::desc("age"));
    let scopes: Vec<Box<dyn FnOnce(ReadDb) -> ReadDb>> =
        vec![Box::new(adults), Box::new(oldest_first)];

    let mut scoped: Vec<User> = Vec::new();
    provider.read.scopes(scopes).find(&mut scoped).result().unwrap();

    let mut manual: Vec<User> = Vec::new();
    provider
        .read
        .filter(expr!("age >= ?", 22))
        .order(OrderBy::desc("age"))
        .find(&mut manual)
        .result()
        .unwrap();

    assert_eq!(scoped, manual);
    assert_eq!(scoped.len(), 4);
    assert_eq!(scoped[0].age, 25);

    let none: Vec<fn(ReadDb) -> ReadDb> = Vec::new();
    assert_eq!(compiled(&provider.read.scopes(none)), compiled(&provider.read));
}

#[test_log::test]
fn test_write_facade_scopes_see_write_facade() {
    let db = TestDatabase::new();
    let write = db.provider().write;
    write.create(&mut User::new("A", 30)).result().unwrap();

    let rename = |facade: WriteDb| facade.table("users").filter(expr!("name = ?", "A"));
    let out = write.scopes([rename]).update_column("name", "B");
    assert_eq!(out.rows_affected(), 1);
}

#[test_log::test]
fn test_scope_from_another_database_is_ignored() {
    let db = TestDatabase::new();
    let other = TestDatabase::new();
    let provider = db.provider();
    provider.write.create(&mut User::new("A", 30)).result().unwrap();

    let foreign = other.provider().read;
    let hijack = move |_: ReadDb| foreign.filter(expr!("age > ?", 100));
    let mut found: Vec<User> = Vec::new();
    provider
        .read
        .scopes([hijack])
        .find(&mut found)
        .result()
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test_log::test]
fn test_dry_run_select_shape() {
    let db = TestDatabase::new();
    let read = db.provider_with(dry_run()).read;

    let mut out: Vec<User> = Vec::new();
    let ran = read
        .filter(expr!("age > ?", 20))
        .order(OrderBy::desc("age"))
        .limit(10)
        .offset(5)
        .find(&mut out);
    assert_eq!(
        ran.statement().sql(),
        r#"SELECT * FROM "users" WHERE age > ? ORDER BY "age" DESC LIMIT ? OFFSET ?"#
    );
    assert_eq!(
        ran.statement().vars(),
        &[Value::Integer(20), Value::Integer(10), Value::Integer(5)]
    );
    assert!(out.is_empty());
}

#[test_log::test]
fn test_dry_run_soft_delete_filter() {
    let db = TestDatabase::new();
    let read = db.provider_with(dry_run()).read;

    let mut out: Vec<City> = Vec::new();
    let scoped = read.filter(expr!("name = ?", "Oslo")).find(&mut out);
    assert_eq!(
        scoped.statement().sql(),
        r#"SELECT * FROM "cities" WHERE name = ? AND "cities"."deleted_at" IS NULL"#
    );

    let either = read
        .filter(expr!("name = ?", "Oslo"))
        .or_filter(expr!("name = ?", "Bergen"))
        .find(&mut out);
    assert_eq!(
        either.statement().sql(),
        r#"SELECT * FROM "cities" WHERE (name = ? OR name = ?) AND "cities"."deleted_at" IS NULL"#
    );

    let all = read.unscoped().find(&mut out);
    assert_eq!(all.statement().sql(), r#"SELECT * FROM "cities""#);
}

#[test_log::test]
fn test_dry_run_write_shapes() {
    let db = TestDatabase::new();
    let write = db.provider_with(dry_run()).write;

    let mut user = User::new("A", 30);
    let created = write.create(&mut user);
    assert_eq!(
        created.statement().sql(),
        r#"INSERT INTO "users" ("name","email","age","created_at","updated_at") VALUES (?,?,?,?,?) RETURNING "id""#
    );
    assert_eq!(user.id, 0);

    let keyed = User { id: 3, ..user };
    let renamed = write.model(&keyed).update_column("name", "B");
    assert_eq!(
        renamed.statement().sql(),
        r#"UPDATE "users" SET "name"=? WHERE "users"."id" = ?"#
    );
    assert_eq!(
        renamed.statement().vars(),
        &[Value::from("B"), Value::Integer(3)]
    );

    let deleted = write.delete(&City { id: 7, ..Default::default() });
    assert_eq!(
        deleted.statement().sql(),
        r#"UPDATE "cities" SET "deleted_at"=? WHERE "cities"."id" = ?"#
    );
}

#[test_log::test]
fn test_update_without_conditions_is_refused() {
    let db = TestDatabase::new();
    let write = db.provider().write;
    write.create(&mut User::new("A", 30)).result().unwrap();

    let out = write.table("users").update_column("age", 1);
    assert!(matches!(
        out.error(),
        Some(spread_db::engine::Error::MissingWhereClause)
    ));

    let global = write
        .session(SessionConfig {
            allow_global_update: true,
            ..Default::default()
        })
        .table("users")
        .update_column("age", 1);
    assert_eq!(global.rows_affected(), 1);
}

#[test_log::test]
fn test_read_facade_refuses_raw_writes() {
    let db = TestDatabase::new();
    let provider = db.provider();

    let row = provider.read.raw("DELETE FROM users").row();
    assert!(matches!(
        row.err(),
        Some(spread_db::engine::Error::ReadOnly(_))
    ));

    let n: i64 = provider
        .read
        .raw("SELECT count(*) FROM users")
        .row()
        .scan()
        .unwrap();
    assert_eq!(n, 0);
}

#[test_log::test]
fn test_pluck_and_count_through_read_facade() {
    let db = TestDatabase::new();
    let provider = db.provider();
    provider
        .write
        .create_in_batches(&mut users(3), 2)
        .result()
        .unwrap();

    let mut names: Vec<String> = Vec::new();
    provider
        .read
        .table("users")
        .order("id")
        .pluck("name", &mut names)
        .result()
        .unwrap();
    assert_eq!(names, ["User 1", "User 2", "User 3"]);

    let mut n = 0;
    provider
        .read
        .table("users")
        .filter(expr!("age > ?", 20))
        .count(&mut n)
        .result()
        .unwrap();
    assert_eq!(n, 2);
}
