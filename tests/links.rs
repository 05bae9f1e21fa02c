mod common;

use common::{Author, Book, Node, TestDb};
use liteorm::{Error, Link, LoadStrategy, RowId, Session};

fn le_guin(db: &TestDb) -> liteorm::Record<Author> {
    let author = db.session.attach(Author {
        name: "Le Guin".to_string(),
    });
    author.save().unwrap();
    author
}

#[test]
fn link_resolves_to_cached_target() {
    let db = TestDb::new();
    let author = le_guin(&db);
    let book_id = db
        .session
        .attach(Book {
            title: "The Dispossessed".to_string(),
            pages: 387,
            author: Link::to(&author),
        })
        .insert()
        .unwrap();

    let book = db.session.get::<Book>(book_id).unwrap();
    let entity = book.read();
    assert_eq!(entity.author.id(), author.id());
    assert!(!entity.author.is_pending());
    let target = entity.author.get().unwrap();
    assert!(target.ptr_eq(&author));
}

#[test]
fn link_loads_target_from_storage() {
    let db = TestDb::new();
    let author = le_guin(&db);
    let book_id = db
        .session
        .attach(Book {
            title: "Lathe of Heaven".to_string(),
            pages: 184,
            author: Link::to(&author),
        })
        .insert()
        .unwrap();

    let fresh = Session::open(db.path()).unwrap();
    let book = fresh.get::<Book>(book_id).unwrap();
    let target = book.read().author.get().cloned().unwrap();
    assert!(!target.ptr_eq(&author));
    assert_eq!(target.read().name, "Le Guin");
    assert!(fresh.get::<Author>(author.id()).unwrap().ptr_eq(&target));
}

#[test]
fn empty_link_round_trips() {
    let db = TestDb::new();
    let book_id = db
        .session
        .attach(Book {
            title: "Anonymous".to_string(),
            ..Default::default()
        })
        .insert()
        .unwrap();

    let book = db.session.get::<Book>(book_id).unwrap();
    let entity = book.read();
    assert!(entity.author.is_none());
    assert!(!entity.author.is_pending());
    assert!(entity.author.get().is_none());
}

#[test]
fn dangling_link_stays_pending() {
    let db = TestDb::new();
    let author = le_guin(&db);
    let author_id = author.id();
    let book_id = db
        .session
        .attach(Book {
            title: "Orphan".to_string(),
            pages: 1,
            author: Link::to(&author),
        })
        .insert()
        .unwrap();

    db.session
        .delete_where::<Author>("_id = ?", &[author_id.into()])
        .unwrap();

    let book = db.session.get::<Book>(book_id).unwrap();
    let entity = book.read();
    assert!(entity.author.is_pending());
    assert_eq!(entity.author.id(), author_id);
    assert!(entity.author.get().is_none());
}

#[test]
fn failed_link_resolution_leaves_nothing_cached() {
    let db = TestDb::new();
    db.session
        .execute("INSERT INTO author (_id, name) VALUES (1, x'00ff')", &[])
        .unwrap();
    db.session
        .execute(
            "INSERT INTO book (_id, title, pages, author) VALUES (1, 'Broken', 10, 1)",
            &[],
        )
        .unwrap();

    let session = Session::builder().bounded_cache(8).open(db.path()).unwrap();
    for _ in 0..2 {
        let err = session.get::<Book>(RowId(1)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(ref e) if e.attr_name == "name"));
    }
    assert!(session.identity_map().is_empty());
}

#[test]
fn explicit_strategy_defers_resolution() {
    let db = TestDb::new();
    let author = le_guin(&db);
    let book_id = db
        .session
        .attach(Book {
            title: "Earthsea".to_string(),
            pages: 200,
            author: Link::to(&author),
        })
        .insert()
        .unwrap();

    let lazy = Session::builder()
        .load_strategy(LoadStrategy::Explicit)
        .open(db.path())
        .unwrap();
    let book = lazy.get::<Book>(book_id).unwrap();
    assert!(book.read().author.is_pending());
    assert_eq!(book.read().author.id(), author.id());

    let target = book.write().author.fetch(&lazy).unwrap().cloned().unwrap();
    assert_eq!(target.read().name, "Le Guin");
    assert!(!book.read().author.is_pending());
}

#[test]
fn reference_cycle_terminates() {
    let db = TestDb::new();
    let a = db.session.attach(Node {
        label: "a".to_string(),
        ..Default::default()
    });
    a.save().unwrap();
    let b = db.session.attach(Node {
        label: "b".to_string(),
        next: Link::to(&a),
    });
    b.save().unwrap();
    a.write().next.set(Some(&b));
    a.save().unwrap();

    let fresh = Session::open(db.path()).unwrap();
    let loaded_a = fresh.get::<Node>(a.id()).unwrap();
    let loaded_b = loaded_a.read().next.get().cloned().unwrap();
    assert_eq!(loaded_b.read().label, "b");
    let back = loaded_b.read().next.get().cloned().unwrap();
    assert!(back.ptr_eq(&loaded_a));

    // break the in-memory cycles so the instances can be dropped
    a.write().next.set(None);
    loaded_a.write().next.set(None);
}

#[test]
fn self_reference_resolves_to_itself() {
    let db = TestDb::new();
    let node = db.session.attach(Node {
        label: "loop".to_string(),
        ..Default::default()
    });
    node.save().unwrap();
    node.write().next.set(Some(&node));
    node.update().unwrap();
    node.write().next.set(None);

    let fresh = Session::open(db.path()).unwrap();
    let loaded = fresh.get::<Node>(node.id()).unwrap();
    let next = loaded.read().next.get().cloned().unwrap();
    assert!(next.ptr_eq(&loaded));
    loaded.write().next.set(None);
}
