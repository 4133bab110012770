use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use bson::{Bson, Uuid};
use chrono::{DateTime, Utc};
use docrepo::{
    Repository,
    autogen::Clock,
    changeset::Changeset,
    codec::FieldKind,
    descriptor::{DescriptorBuilder, EntityDescriptor},
    entity::Entity,
    error::DocumentStoreError,
    filter::FieldValues,
    memory::InMemoryStore,
    query::{Predicate, Query, SortDirection},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    fn at(millis: i64) -> Self {
        Self { millis: Arc::new(AtomicI64::new(millis)) }
    }

    fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> bson::DateTime {
        bson::DateTime::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    id: Option<Uuid>,
    nickname: String,
    email: String,
    inserted_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Account {
    fn new(nickname: &str, email: &str) -> Self {
        Self {
            id: None,
            nickname: nickname.to_string(),
            email: email.to_string(),
            inserted_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Account {
    fn schema() -> DescriptorBuilder {
        EntityDescriptor::builder("accounts")
            .primary_key("id", FieldKind::Id, true)
            .field("nickname", FieldKind::String)
            .field("email", FieldKind::String)
            .timestamps()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    slug: Option<String>,
    body: String,
    stars: i64,
}

impl Entity for Note {
    fn schema() -> DescriptorBuilder {
        EntityDescriptor::builder("notes")
            .primary_key("slug", FieldKind::String, true)
            .field("body", FieldKind::String)
            .field("stars", FieldKind::Integer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Event {
    kind: String,
}

impl Entity for Event {
    fn schema() -> DescriptorBuilder {
        EntityDescriptor::builder("events").field("kind", FieldKind::String)
    }
}

/// Keeps its timestamps in the engine's native datetime type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    id: Option<Uuid>,
    sensor: String,
    inserted_at: Option<bson::DateTime>,
    updated_at: Option<bson::DateTime>,
}

impl Entity for Reading {
    fn schema() -> DescriptorBuilder {
        EntityDescriptor::builder("readings")
            .primary_key("id", FieldKind::Id, true)
            .field("sensor", FieldKind::String)
            .timestamps()
    }
}

/// Declares a field twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Broken {
    name: String,
}

impl Entity for Broken {
    fn schema() -> DescriptorBuilder {
        EntityDescriptor::builder("broken")
            .field("name", FieldKind::String)
            .field("name", FieldKind::String)
    }
}

/// Carries a field its declaration does not mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Undeclared {
    name: String,
    secret: String,
}

impl Entity for Undeclared {
    fn schema() -> DescriptorBuilder {
        EntityDescriptor::builder("undeclared").field("name", FieldKind::String)
    }
}

fn utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn repository(clock: &ManualClock) -> Repository<InMemoryStore> {
    Repository::builder(InMemoryStore::new())
        .clock(clock.clone())
        .build()
}

#[tokio::test]
async fn insert_generates_a_key() {
    let repo = repository(&ManualClock::at(1_000));

    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    let id = account.id.unwrap();
    assert_ne!(id, Uuid::from_bytes([0; 16]));
    assert_eq!(repo.get::<Account>(id).await.unwrap(), account);
}

#[tokio::test]
async fn plain_insert_sets_equal_timestamps() {
    let repo = repository(&ManualClock::at(1_000));

    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    assert_eq!(account.inserted_at, Some(utc(1_000)));
    assert_eq!(account.inserted_at, account.updated_at);
}

#[tokio::test]
async fn system_clock_timestamps_are_not_before_the_call() {
    let repo = Repository::new(InMemoryStore::new());
    let before = bson::DateTime::now();

    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    let inserted_at = account.inserted_at.unwrap();
    assert_eq!(account.updated_at, Some(inserted_at));
    assert!(bson::DateTime::from_chrono(inserted_at) >= before);
}

#[tokio::test]
async fn native_datetime_timestamps_round_trip() {
    let clock = ManualClock::at(1_000);
    let repo = repository(&clock);

    let reading = repo
        .insert(Reading { id: None, sensor: "s1".into(), inserted_at: None, updated_at: None })
        .await
        .unwrap();
    assert_eq!(reading.inserted_at, Some(bson::DateTime::from_millis(1_000)));
    assert_eq!(reading.inserted_at, reading.updated_at);

    let found = repo
        .get_by::<Reading>(
            FieldValues::new()
                .with("sensor", "s1")
                .with("updated_at", reading.updated_at.unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(found, Some(reading.clone()));

    clock.advance(5);
    let updated = repo.update(Changeset::new(reading.clone())).await.unwrap();
    assert_eq!(updated.updated_at, Some(bson::DateTime::from_millis(1_005)));
    assert_eq!(repo.get::<Reading>(reading.id.unwrap()).await.unwrap(), updated);
}

#[tokio::test]
async fn explicit_updated_at_on_insert_is_preserved() {
    let repo = repository(&ManualClock::at(1_000_000));
    let five_years_ago = utc(1_000);

    let account = repo
        .insert(
            Changeset::new(Account::new("test", "test345@gmail.com"))
                .change("updated_at", five_years_ago.to_rfc3339()),
        )
        .await
        .unwrap();

    assert_eq!(account.updated_at, Some(five_years_ago));
    assert_eq!(account.inserted_at, Some(utc(1_000_000)));
    assert!(account.updated_at < account.inserted_at);
}

#[tokio::test]
async fn timestamps_on_the_base_instance_are_not_explicit() {
    let repo = repository(&ManualClock::at(2_000));
    let mut account = Account::new("test", "test345@gmail.com");
    account.updated_at = Some(utc(1));

    let account = repo.insert(account).await.unwrap();

    assert_eq!(account.updated_at, Some(utc(2_000)));
}

#[tokio::test]
async fn update_refreshes_updated_at_only() {
    let clock = ManualClock::at(1_000);
    let repo = repository(&clock);
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    clock.advance(500);
    let updated = repo
        .update(Changeset::new(account.clone()).change("nickname", "renamed"))
        .await
        .unwrap();

    assert_eq!(updated.nickname, "renamed");
    assert_eq!(updated.email, account.email);
    assert_eq!(updated.inserted_at, account.inserted_at);
    assert!(updated.updated_at > account.updated_at);
    assert_eq!(repo.get::<Account>(account.id.unwrap()).await.unwrap(), updated);
}

#[tokio::test]
async fn empty_changeset_still_bumps_updated_at() {
    let clock = ManualClock::at(1_000);
    let repo = repository(&clock);
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    clock.advance(1);
    let updated = repo.update(Changeset::new(account)).await.unwrap();

    assert!(updated.updated_at > updated.inserted_at);
}

#[tokio::test]
async fn update_ignores_changes_to_inserted_at() {
    let clock = ManualClock::at(1_000);
    let repo = repository(&clock);
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    let updated = repo
        .update(Changeset::new(account).change("inserted_at", utc(5).to_rfc3339()))
        .await
        .unwrap();

    assert_eq!(updated.inserted_at, Some(utc(1_000)));
}

#[tokio::test]
async fn get_by_matches_every_field_alone_and_together() {
    let clock = ManualClock::at(1_000);
    let repo = repository(&clock);
    repo.insert(Account::new("other", "other@gmail.com"))
        .await
        .unwrap();
    clock.advance(10);
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();
    clock.advance(10);
    let account = repo
        .update(Changeset::new(account).change("email", "new@gmail.com"))
        .await
        .unwrap();

    let id = account.id.unwrap();
    let inserted_at = account.inserted_at.unwrap().to_rfc3339();
    let updated_at = account.updated_at.unwrap().to_rfc3339();
    let lookups = [
        FieldValues::new().with("id", id),
        FieldValues::new().with("id", id.to_string()),
        FieldValues::new().with("nickname", "test"),
        FieldValues::new().with("email", "new@gmail.com"),
        FieldValues::new().with("inserted_at", inserted_at.clone()),
        FieldValues::new().with("updated_at", updated_at.clone()),
        FieldValues::new()
            .with("id", id)
            .with("nickname", "test")
            .with("email", "new@gmail.com")
            .with("inserted_at", inserted_at)
            .with("updated_at", updated_at),
    ];

    for values in lookups {
        assert_eq!(
            repo.get_by::<Account>(values.clone()).await.unwrap(),
            Some(account.clone()),
            "lookup by {values:?}"
        );
    }
}

#[tokio::test]
async fn get_by_returns_none_without_a_match() {
    let repo = repository(&ManualClock::at(0));
    repo.insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    let found = repo
        .get_by::<Account>(FieldValues::new().with("nickname", "test").with("email", "nope"))
        .await
        .unwrap();

    assert_eq!(found, None);
}

#[tokio::test]
async fn get_by_rejects_undeclared_fields_and_bad_values() {
    let repo = repository(&ManualClock::at(0));

    assert!(matches!(
        repo.get_by::<Account>(FieldValues::new().with("password", "x")).await,
        Err(DocumentStoreError::UnknownField(field, _)) if field == "password"
    ));
    assert!(matches!(
        repo.get_by::<Account>(FieldValues::new().with("id", "not-a-uuid")).await,
        Err(DocumentStoreError::TypeMismatch { expected: FieldKind::Id, .. })
    ));
}

#[tokio::test]
async fn entities_without_timestamps_get_none() {
    let repo = repository(&ManualClock::at(1_000));

    let note = repo
        .insert(Note { slug: None, body: "hello".into(), stars: 1 })
        .await
        .unwrap();
    let slug = note.slug.clone().unwrap();
    assert!(Uuid::parse_str(&slug).is_ok());

    let note = repo
        .update(Changeset::new(note).change("stars", 2_i64))
        .await
        .unwrap();
    assert_eq!(note.stars, 2);

    let descriptor = repo.descriptor::<Note>().await.unwrap();
    assert!(!descriptor.timestamps_enabled());
    assert!(descriptor.field("inserted_at").is_none());
    assert!(descriptor.field("updated_at").is_none());
}

#[tokio::test]
async fn update_without_changes_rereads_the_stored_entity() {
    let repo = repository(&ManualClock::at(0));
    let note = repo
        .insert(Note { slug: Some("intro".into()), body: "hello".into(), stars: 0 })
        .await
        .unwrap();

    let stale = Note { body: "edited locally".into(), ..note.clone() };
    let unchanged = repo.update(Changeset::new(stale)).await.unwrap();
    assert_eq!(unchanged, note);

    repo.delete(&note).await.unwrap();
    assert!(matches!(
        repo.update(Changeset::new(note)).await,
        Err(DocumentStoreError::NotFound(_, collection)) if collection == "notes"
    ));
}

#[tokio::test]
async fn supplied_keys_are_kept_and_must_be_unique() {
    let repo = repository(&ManualClock::at(0));
    let note = Note { slug: Some("intro".into()), body: "hello".into(), stars: 0 };

    let stored = repo.insert(note.clone()).await.unwrap();
    assert_eq!(stored, note);

    assert!(matches!(
        repo.insert(note).await,
        Err(DocumentStoreError::DocumentAlreadyExists(_, collection)) if collection == "notes"
    ));
}

#[tokio::test]
async fn update_and_delete_require_a_persisted_entity() {
    let repo = repository(&ManualClock::at(0));
    let fresh = Account::new("test", "test345@gmail.com");

    assert!(matches!(
        repo.update(Changeset::new(fresh.clone()).change("nickname", "x")).await,
        Err(DocumentStoreError::Precondition(_))
    ));
    assert!(matches!(repo.delete(&fresh).await, Err(DocumentStoreError::Precondition(_))));
}

#[tokio::test]
async fn update_cannot_change_the_primary_key() {
    let repo = repository(&ManualClock::at(0));
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    assert!(matches!(
        repo.update(Changeset::new(account).change("id", Uuid::new())).await,
        Err(DocumentStoreError::Precondition(_))
    ));
}

#[tokio::test]
async fn update_accepts_the_current_primary_key() {
    let clock = ManualClock::at(0);
    let repo = repository(&clock);
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();
    let id = account.id.unwrap();

    clock.advance(1);
    let updated = repo
        .update(
            Changeset::new(account)
                .change("id", id.to_string())
                .change("nickname", "renamed"),
        )
        .await
        .unwrap();

    assert_eq!(updated.id, Some(id));
    assert_eq!(updated.nickname, "renamed");
}

#[tokio::test]
async fn update_rejects_undeclared_fields() {
    let repo = repository(&ManualClock::at(0));
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    assert!(matches!(
        repo.update(Changeset::new(account).change("password", "x")).await,
        Err(DocumentStoreError::UnknownField(field, _)) if field == "password"
    ));
}

#[tokio::test]
async fn delete_returns_the_stored_entity() {
    let repo = repository(&ManualClock::at(0));
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();
    let id = account.id.unwrap();

    let deleted = repo.delete(&account).await.unwrap();

    assert_eq!(deleted, account);
    assert!(matches!(
        repo.get::<Account>(id).await,
        Err(DocumentStoreError::NotFound(_, collection)) if collection == "accounts"
    ));
    assert!(matches!(repo.delete(&account).await, Err(DocumentStoreError::NotFound(..))));
}

#[tokio::test]
async fn get_accepts_the_key_as_a_string() {
    let repo = repository(&ManualClock::at(0));
    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    let found = repo
        .get::<Account>(account.id.unwrap().to_string())
        .await
        .unwrap();

    assert_eq!(found, account);
}

#[tokio::test]
async fn key_operations_need_a_primary_key() {
    let repo = repository(&ManualClock::at(0));

    let event = repo.insert(Event { kind: "login".into() }).await.unwrap();
    assert_eq!(event.kind, "login");

    assert!(matches!(repo.get::<Event>(Bson::Int32(1)).await, Err(DocumentStoreError::Precondition(_))));
    assert!(matches!(repo.delete(&event).await, Err(DocumentStoreError::Precondition(_))));

    let found = repo
        .get_by::<Event>(FieldValues::new().with("kind", "login"))
        .await
        .unwrap();
    assert_eq!(found.map(|event| event.kind), Some("login".to_string()));
}

#[tokio::test]
async fn malformed_declarations_fail_on_resolution() {
    let repo = repository(&ManualClock::at(0));

    assert!(matches!(
        repo.insert(Broken { name: "x".into() }).await,
        Err(DocumentStoreError::Configuration(collection, _)) if collection == "broken"
    ));
    assert!(matches!(
        Repository::builder(InMemoryStore::new()).register::<Broken>(),
        Err(DocumentStoreError::Configuration(..))
    ));
}

#[tokio::test]
async fn entities_with_undeclared_fields_cannot_be_inserted() {
    let repo = repository(&ManualClock::at(0));

    assert!(matches!(
        repo.insert(Undeclared { name: "x".into(), secret: "y".into() }).await,
        Err(DocumentStoreError::UnknownField(field, _)) if field == "secret"
    ));
}

#[tokio::test]
async fn eager_registration_resolves_descriptors() {
    let repo = Repository::builder(InMemoryStore::new())
        .register::<Account>()
        .unwrap()
        .register::<Note>()
        .unwrap()
        .build();

    let descriptor = repo.descriptor::<Account>().await.unwrap();

    assert_eq!(descriptor.collection(), "accounts");
    assert_eq!(
        descriptor
            .fields()
            .iter()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>(),
        vec!["id", "nickname", "email", "inserted_at", "updated_at"]
    );
}

#[tokio::test]
async fn all_filters_sorts_and_pages() {
    let clock = ManualClock::at(1_000);
    let repo = repository(&clock);
    for nickname in ["a", "b", "c", "d"] {
        repo.insert(Account::new(nickname, "x@gmail.com"))
            .await
            .unwrap();
        clock.advance(100);
    }

    let query = Query::builder()
        .filter(Predicate::gt("inserted_at", utc(1_000).to_rfc3339()))
        .sort("inserted_at", SortDirection::Desc)
        .limit(2)
        .build();

    let nicknames = repo
        .all::<Account>(query)
        .await
        .unwrap()
        .into_iter()
        .map(|account| account.nickname)
        .collect::<Vec<_>>();

    assert_eq!(nicknames, vec!["d", "c"]);
}

#[tokio::test]
async fn concurrent_inserts_get_distinct_keys() {
    let repo = repository(&ManualClock::at(0));

    let (a, b, c) = tokio::join!(
        repo.insert(Account::new("a", "a@gmail.com")),
        repo.insert(Account::new("b", "b@gmail.com")),
        repo.insert(Account::new("c", "c@gmail.com")),
    );
    let ids = [a.unwrap().id, b.unwrap().id, c.unwrap().id];

    assert!(ids.iter().all(Option::is_some));
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
}

#[tokio::test]
async fn dynamic_repository_behaves_the_same() {
    let repo = repository(&ManualClock::at(0)).into_dyn();

    let account = repo
        .insert(Account::new("test", "test345@gmail.com"))
        .await
        .unwrap();

    assert_eq!(repo.get::<Account>(account.id.unwrap()).await.unwrap(), account);
    assert_eq!(repo.list_collections().await.unwrap(), vec!["accounts".to_string()]);

    repo.shutdown().await.unwrap();
}
