mod common;

use common::{init_logs, registry, Author, Person, TestDb};
use liteorm::{
    schema::{build_create_statement, list_tables},
    Entity, Error, FieldKind, Registry, RowId, Session, Value,
};

#[derive(Entity, Default)]
#[allow(non_snake_case)]
struct AppUser {
    #[column_name("login")]
    user_name: String,
    lastSeen: i64,
}

#[derive(Entity, Default)]
struct Grade {
    letter: char,
}

#[derive(Entity, Default)]
struct Tally {
    small: i16,
}

#[derive(Entity, Default)]
struct Clash {
    #[column_name("value")]
    first: i32,
    #[column_name("value")]
    second: i32,
}

#[derive(Entity, Default)]
#[table_name("person")]
struct Impostor {
    name: String,
}

mod inventory {
    use liteorm::Entity;

    #[derive(Entity, Default)]
    pub struct Item {
        pub name: String,
    }
}

mod catalog {
    use liteorm::Entity;

    #[derive(Entity, Default)]
    #[table_name("catalog_item")]
    pub struct Item {
        pub title: String,
    }
}

#[test]
fn descriptor_lists_persisted_fields() {
    let schema = Person::schema();
    assert_eq!(schema.simple_name, "Person");
    assert!(schema.type_name.ends_with("::Person"));
    assert_eq!(schema.table_name, "person");
    assert_eq!(
        schema.column_names().collect::<Vec<_>>(),
        ["name", "age", "height", "active", "nickname", "avatar", "born"]
    );
    assert_eq!(schema.fields[6].kind, FieldKind::Timestamp);
    assert_eq!(schema.field_by_attr("age").map(|(i, _)| i), Some(1));
    assert!(schema.field_by_attr("visits").is_none());
}

#[test]
fn create_statement_has_id_and_one_column_per_field() {
    assert_eq!(
        build_create_statement(Person::schema()).unwrap(),
        "CREATE TABLE person (_id integer primary key, name text, age int, height real, \
         active bool, nickname text, avatar blob, born int)"
    );
    assert_eq!(
        build_create_statement(Author::schema()).unwrap(),
        "CREATE TABLE author (_id integer primary key, name text)"
    );
}

#[test]
fn names_default_to_snake_case() {
    let schema = AppUser::schema();
    assert_eq!(schema.table_name, "app_user");
    assert_eq!(
        schema.column_names().collect::<Vec<_>>(),
        ["login", "last_seen"]
    );
    assert_eq!(schema.fields[1].attr_name, "lastSeen");
}

#[test]
fn unmapped_kinds_are_configuration_errors() {
    init_logs();
    assert!(matches!(
        build_create_statement(Grade::schema()),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        build_create_statement(Tally::schema()),
        Err(Error::Configuration(_))
    ));

    let mut registry = Registry::new();
    registry.register::<Grade>().unwrap();
    let session = Session::open_in_memory().unwrap();
    assert!(matches!(
        session.create_schema(&registry),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn registry_rejects_conflicts() {
    let mut registry = Registry::new();
    registry.register::<Person>().unwrap();
    registry.register::<Person>().unwrap();
    assert_eq!(registry.len(), 1);

    assert!(matches!(
        registry.register::<Impostor>(),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        registry.register::<Clash>(),
        Err(Error::Configuration(_))
    ));

    registry.register::<inventory::Item>().unwrap();
    let err = registry.register::<catalog::Item>().unwrap_err();
    match err {
        Error::Configuration(e) => assert!(e.type_name.ends_with("catalog::Item")),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(registry.len(), 2);
}

#[test]
fn registry_lookup_by_simple_name() {
    let registry = registry();
    assert_eq!(list_tables(&registry), ["person", "author", "book", "nodes"]);
    assert_eq!(registry.get("Book").unwrap().schema().table_name, "book");
    assert!(matches!(
        registry.get("Missing"),
        Err(Error::Configuration(_))
    ));
    assert!(registry
        .create_statement("Node")
        .unwrap()
        .starts_with("CREATE TABLE nodes (_id integer primary key"));
}

#[test]
fn create_schema_skips_existing_tables() {
    let db = TestDb::new();
    db.session.attach(common::ann()).insert().unwrap();
    db.session.create_schema(&registry()).unwrap();
    assert_eq!(db.session.find_all::<Person>().unwrap().len(), 1);
}

#[test]
fn upgrade_rebuilds_on_version_change() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(dir.path().join("upgrade.db")).unwrap();
    let registry = registry();

    assert!(session.upgrade(&registry, 1).unwrap());
    let record = session.attach(common::ann());
    record.save().unwrap();

    assert!(!session.upgrade(&registry, 1).unwrap());
    assert_eq!(session.find_all::<Person>().unwrap().len(), 1);

    assert!(session.upgrade(&registry, 2).unwrap());
    assert!(session.find_all::<Person>().unwrap().is_empty());
    assert!(session.identity_map().get::<Person>(record.id()).is_none());

    let version = session.query_rows("PRAGMA user_version", &[]).unwrap();
    assert_eq!(version.rows[0][0], Value::Integer(2));
}

#[test]
fn missing_column_is_reported() {
    init_logs();
    let session = Session::open_in_memory().unwrap();
    session
        .execute("CREATE TABLE author (_id integer primary key)", &[])
        .unwrap();

    match session.find_all::<Author>().unwrap_err() {
        Error::MissingColumn(e) => {
            assert_eq!(e.column_name, "name");
            assert_eq!(e.attr_name, "name");
            assert_eq!(e.table_name, "author");
        }
        other => panic!("unexpected error: {}", other),
    }

    let record = session.attach(Author {
        name: "Nobody".to_string(),
    });
    assert!(matches!(record.insert(), Err(Error::MissingColumn(_))));
    assert_eq!(record.id(), RowId::NONE);
}
