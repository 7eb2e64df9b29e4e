//! Tests for the key-value user repository.

use super::*;
use crate::domain::UserValidationError;
use crate::domain::ports::MockKeyValueStore;
use crate::outbound::kv::MemoryStore;
use crate::test_support::{FlakyStore, MutableClock, fixture_instant};
use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<MutableClock>,
    repo: KvUserRepository<MemoryStore>,
    ctx: RequestContext,
}

impl Harness {
    async fn seed_fixtures(&self) -> (User, User) {
        let users = self
            .repo
            .create_fixture(&self.ctx)
            .await
            .expect("fixtures seed");
        match <[User; 2]>::try_from(users) {
            Ok([a, b]) => (a, b),
            Err(other) => panic!("expected two fixture users, got {}", other.len()),
        }
    }

    fn claim_keys(&self, kind: ClaimKind) -> Vec<String> {
        self.store
            .keys_with_prefix(&self.repo.key_space().claims(kind))
            .expect("list claims")
    }

    async fn owner(&self, kind: ClaimKind, value: &str) -> Option<UserId> {
        self.repo
            .index()
            .owner(kind, value)
            .await
            .expect("owner lookup")
    }
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(MutableClock::new(fixture_instant()));
    let repo = KvUserRepository::with_key_space(
        Arc::clone(&store),
        KeySpace::new("test"),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    Harness {
        store,
        clock,
        repo,
        ctx: RequestContext::background(),
    }
}

#[rstest]
#[tokio::test]
async fn create_assigns_identity_timestamps_and_claims(harness: Harness) {
    let user = harness
        .repo
        .create(&harness.ctx, NewUser::new("Ada@Example.test", "Ada", 36))
        .await
        .expect("create succeeds");

    assert_eq!(user.id(), UserId::new(1));
    assert_eq!(user.email(), "Ada@Example.test");
    assert_eq!(user.created_at(), fixture_instant());
    assert_eq!(user.updated_at(), fixture_instant());
    assert_eq!(
        harness.claim_keys(ClaimKind::Email),
        vec!["test:claim:email:ada@example.test".to_owned()]
    );
    assert_eq!(
        harness.claim_keys(ClaimKind::ScreenName),
        vec!["test:claim:screen_name:ada".to_owned()]
    );
    assert_eq!(
        harness.owner(ClaimKind::Email, "ada@example.test").await,
        Some(user.id())
    );
    assert_eq!(harness.repo.get_by_id(&harness.ctx, user.id()).await, Ok(user));
}

#[rstest]
#[case::email_differs_in_case("FOO@x.test", "new", UserRepositoryError::EmailCannotTake)]
#[case::screen_name_differs_in_case(
    "new@x.test",
    "FOO",
    UserRepositoryError::ScreenNameCannotTake
)]
#[case::malformed_email(
    "bad_email",
    "new",
    UserRepositoryError::ValidationFailed(UserValidationError::InvalidEmail)
)]
#[case::both_taken("bar@x.test", "bar", UserRepositoryError::EmailCannotTake)]
#[tokio::test]
async fn create_rejects_without_writing(
    harness: Harness,
    #[case] email: &str,
    #[case] screen_name: &str,
    #[case] expected: UserRepositoryError,
) {
    harness.seed_fixtures().await;
    let before = harness.store.snapshot().expect("snapshot");

    let result = harness
        .repo
        .create(&harness.ctx, NewUser::new(email, screen_name, 40))
        .await;

    assert_eq!(result, Err(expected));
    assert_eq!(harness.store.snapshot().expect("snapshot"), before);
}

#[rstest]
#[tokio::test]
async fn create_succeeds_for_unclaimed_values_next_to_fixtures(harness: Harness) {
    let (a, b) = harness.seed_fixtures().await;

    let user = harness
        .repo
        .create(&harness.ctx, NewUser::new("new@x.test", "new", 40))
        .await
        .expect("create succeeds");

    assert_ne!(user.id(), a.id());
    assert_ne!(user.id(), b.id());
    assert_eq!(harness.claim_keys(ClaimKind::Email).len(), 3);
    assert_eq!(harness.claim_keys(ClaimKind::ScreenName).len(), 3);
}

#[rstest]
#[tokio::test]
async fn create_fixture_returns_users_in_order_and_is_not_repeatable(harness: Harness) {
    let (a, b) = harness.seed_fixtures().await;

    assert_eq!((a.email(), a.screen_name(), a.age()), ("foo@x.test", "foo", 20));
    assert_eq!((b.email(), b.screen_name(), b.age()), ("bar@x.test", "bar", 30));
    assert_eq!(
        harness.repo.create_fixture(&harness.ctx).await,
        Err(UserRepositoryError::EmailCannotTake)
    );
}

#[rstest]
#[tokio::test]
async fn get_by_id_reports_missing_user(harness: Harness) {
    let result = harness.repo.get_by_id(&harness.ctx, UserId::new(42)).await;
    assert_eq!(
        result,
        Err(UserRepositoryError::NoSuchEntity {
            id: UserId::new(42)
        })
    );
}

#[rstest]
#[tokio::test]
async fn age_only_update_leaves_claims_and_creation_time(harness: Harness) {
    let (mut a, _) = harness.seed_fixtures().await;
    let claims_before = (
        harness.claim_keys(ClaimKind::Email),
        harness.claim_keys(ClaimKind::ScreenName),
    );
    harness.clock.advance_seconds(90);

    a.set_age(21);
    let updated = harness
        .repo
        .update(&harness.ctx, &a)
        .await
        .expect("update succeeds");

    assert_eq!(updated.age(), 21);
    assert_eq!(updated.created_at(), fixture_instant());
    assert_eq!(
        updated.updated_at(),
        fixture_instant() + chrono::TimeDelta::seconds(90)
    );
    assert_eq!(
        (
            harness.claim_keys(ClaimKind::Email),
            harness.claim_keys(ClaimKind::ScreenName),
        ),
        claims_before
    );
    assert_eq!(harness.repo.get_by_id(&harness.ctx, a.id()).await, Ok(updated));
}

#[rstest]
#[tokio::test]
async fn update_into_taken_email_changes_nothing(harness: Harness) {
    let (a, b) = harness.seed_fixtures().await;
    let before = harness.store.snapshot().expect("snapshot");

    let mut changed = a.clone();
    changed.set_email("BAR@x.test");
    let result = harness.repo.update(&harness.ctx, &changed).await;

    assert_eq!(result, Err(UserRepositoryError::EmailCannotTake));
    assert_eq!(harness.store.snapshot().expect("snapshot"), before);
    assert_eq!(
        harness.owner(ClaimKind::Email, "foo@x.test").await,
        Some(a.id())
    );
    assert_eq!(harness.repo.get_by_id(&harness.ctx, b.id()).await, Ok(b));
}

#[rstest]
#[tokio::test]
async fn update_into_taken_screen_name_changes_nothing(harness: Harness) {
    let (a, _) = harness.seed_fixtures().await;
    let before = harness.store.snapshot().expect("snapshot");

    let mut changed = a;
    changed.set_screen_name("Bar");
    let result = harness.repo.update(&harness.ctx, &changed).await;

    assert_eq!(result, Err(UserRepositoryError::ScreenNameCannotTake));
    assert_eq!(harness.store.snapshot().expect("snapshot"), before);
}

#[rstest]
#[tokio::test]
async fn update_moves_changed_claims(harness: Harness) {
    let (mut a, _) = harness.seed_fixtures().await;

    a.set_email("fresh@x.test");
    a.set_screen_name("fresh");
    harness
        .repo
        .update(&harness.ctx, &a)
        .await
        .expect("update succeeds");

    assert_eq!(harness.owner(ClaimKind::Email, "foo@x.test").await, None);
    assert_eq!(harness.owner(ClaimKind::ScreenName, "foo").await, None);
    assert_eq!(
        harness.owner(ClaimKind::Email, "FRESH@x.test").await,
        Some(a.id())
    );
    assert_eq!(
        harness.owner(ClaimKind::ScreenName, "fresh").await,
        Some(a.id())
    );

    let reuse = harness
        .repo
        .create(&harness.ctx, NewUser::new("foo@x.test", "foo", 50))
        .await;
    assert!(reuse.is_ok(), "released values are reusable: {reuse:?}");
}

#[rstest]
#[tokio::test]
async fn case_only_change_keeps_claim_and_updates_stored_casing(harness: Harness) {
    let (mut a, _) = harness.seed_fixtures().await;
    let claims_before = harness.claim_keys(ClaimKind::Email);

    a.set_email("Foo@X.test");
    let updated = harness
        .repo
        .update(&harness.ctx, &a)
        .await
        .expect("update succeeds");

    assert_eq!(updated.email(), "Foo@X.test");
    assert_eq!(harness.claim_keys(ClaimKind::Email), claims_before);
    assert_eq!(
        harness.owner(ClaimKind::Email, "foo@x.test").await,
        Some(a.id())
    );
}

#[rstest]
#[tokio::test]
async fn update_rejects_malformed_fields_before_reading(harness: Harness) {
    let (mut a, _) = harness.seed_fixtures().await;
    a.set_screen_name("not valid");

    assert_eq!(
        harness.repo.update(&harness.ctx, &a).await,
        Err(UserRepositoryError::ValidationFailed(
            UserValidationError::ScreenNameInvalidCharacters
        ))
    );
}

#[rstest]
#[tokio::test]
async fn update_and_delete_of_absent_user_report_missing(harness: Harness) {
    let ghost =
        NewUser::new("ghost@x.test", "ghost", 1).into_user(UserId::new(99), fixture_instant());
    let missing = UserRepositoryError::NoSuchEntity {
        id: UserId::new(99),
    };

    assert_eq!(
        harness.repo.update(&harness.ctx, &ghost).await,
        Err(missing.clone())
    );
    assert_eq!(harness.repo.delete(&harness.ctx, &ghost).await, Err(missing));
    assert!(harness.store.snapshot().expect("snapshot").is_empty());
}

#[rstest]
#[tokio::test]
async fn delete_removes_user_and_frees_both_claims(harness: Harness) {
    let (a, _) = harness.seed_fixtures().await;

    harness
        .repo
        .delete(&harness.ctx, &a)
        .await
        .expect("delete succeeds");

    assert_eq!(
        harness.repo.get_by_id(&harness.ctx, a.id()).await,
        Err(UserRepositoryError::NoSuchEntity { id: a.id() })
    );
    assert!(
        harness
            .repo
            .index()
            .is_email_available("FOO@x.test", None)
            .await
            .expect("lookup")
    );
    assert!(
        harness
            .repo
            .index()
            .is_screen_name_available("foo", None)
            .await
            .expect("lookup")
    );
    assert_eq!(
        harness.repo.delete(&harness.ctx, &a).await,
        Err(UserRepositoryError::NoSuchEntity { id: a.id() })
    );
}

#[rstest]
#[tokio::test]
async fn delete_releases_stored_claims_not_stale_copy(harness: Harness) {
    let (a, _) = harness.seed_fixtures().await;
    let mut stale = a.clone();
    stale.set_email("elsewhere@x.test");

    harness
        .repo
        .delete(&harness.ctx, &stale)
        .await
        .expect("delete succeeds");

    assert_eq!(harness.owner(ClaimKind::Email, "foo@x.test").await, None);
    assert_eq!(harness.claim_keys(ClaimKind::Email).len(), 1);
}

#[rstest]
#[tokio::test]
async fn cancelled_context_writes_nothing(harness: Harness) {
    let token = CancellationToken::new();
    token.cancel();
    let ctx = RequestContext::background().with_cancellation(token);

    let result = harness
        .repo
        .create(&ctx, NewUser::new("new@x.test", "new", 40))
        .await;

    assert_eq!(
        result,
        Err(UserRepositoryError::Store(StoreError::cancelled("check_claim")))
    );
    assert!(harness.store.snapshot().expect("snapshot").is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_commit_leaves_no_partial_records() {
    let store = Arc::new(FlakyStore::new());
    let repo = KvUserRepository::new(
        Arc::clone(&store),
        Arc::new(MutableClock::new(fixture_instant())) as Arc<dyn Clock>,
    );
    let ctx = RequestContext::background();
    let a = repo
        .create(&ctx, NewUser::new("foo@x.test", "foo", 20))
        .await
        .expect("create succeeds");
    let before = store.inner().snapshot().expect("snapshot");
    store.set_failing(true);

    let mut changed = a.clone();
    changed.set_email("moved@x.test");
    let update = repo.update(&ctx, &changed).await;
    let delete = repo.delete(&ctx, &a).await;
    let create = repo
        .create(&ctx, NewUser::new("new@x.test", "new", 40))
        .await;

    let injected = StoreError::backend("injected commit failure");
    assert_eq!(update, Err(UserRepositoryError::Store(injected.clone())));
    assert_eq!(delete, Err(UserRepositoryError::Store(injected.clone())));
    assert_eq!(create, Err(UserRepositoryError::Store(injected)));
    assert_eq!(store.commit_attempts(), 4);
    assert_eq!(store.inner().snapshot().expect("snapshot"), before);
}

fn racing_store(rejected_key: &'static str) -> MockKeyValueStore {
    let mut store = MockKeyValueStore::new();
    store.expect_get().returning(|_| Ok(None));
    store.expect_next_id().returning(|_| Ok(7));
    store
        .expect_commit()
        .times(1)
        .returning(move |_| Err(StoreError::precondition_failed(rejected_key)));
    store
}

#[rstest]
#[case::email_claimed_first("test:claim:email:ada@x.test", UserRepositoryError::EmailCannotTake)]
#[case::screen_name_claimed_first(
    "test:claim:screen_name:ada",
    UserRepositoryError::ScreenNameCannotTake
)]
#[case::user_key_collision(
    "test:user:7",
    UserRepositoryError::Store(StoreError::precondition_failed("test:user:7"))
)]
#[tokio::test]
async fn lost_commit_race_names_the_contested_value(
    #[case] rejected_key: &'static str,
    #[case] expected: UserRepositoryError,
) {
    let repo = KvUserRepository::with_key_space(
        Arc::new(racing_store(rejected_key)),
        KeySpace::new("test"),
        Arc::new(MutableClock::new(fixture_instant())) as Arc<dyn Clock>,
    );

    let result = repo
        .create(
            &RequestContext::background(),
            NewUser::new("Ada@X.test", "ADA", 36),
        )
        .await;

    assert_eq!(result, Err(expected));
}

#[rstest]
#[tokio::test]
async fn store_failures_are_not_reinterpreted() {
    let mut store = MockKeyValueStore::new();
    store
        .expect_get()
        .returning(|_| Err(StoreError::connection("connection refused")));
    let repo = KvUserRepository::new(Arc::new(store), Arc::new(mockable::DefaultClock));

    let result = repo
        .create(
            &RequestContext::background(),
            NewUser::new("ada@x.test", "ada", 36),
        )
        .await;

    assert_eq!(
        result,
        Err(UserRepositoryError::Store(StoreError::connection(
            "connection refused"
        )))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_for_same_email_admit_exactly_one(harness: Harness) {
    for round in 0..16 {
        let email = format!("race{round}@x.test");
        let contenders = [
            (email.clone(), format!("left{round}")),
            (email.to_uppercase(), format!("right{round}")),
        ];

        let tasks = contenders.map(|(email, screen_name)| {
            let repo = harness.repo.clone();
            let ctx = harness.ctx.clone();
            tokio::spawn(async move {
                repo.create(&ctx, NewUser::new(email, screen_name, 30))
                    .await
            })
        });

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.expect("create task"));
        }

        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(winners, 1, "round {round}: {outcomes:?}");
        assert!(
            outcomes
                .iter()
                .any(|outcome| outcome == &Err(UserRepositoryError::EmailCannotTake)),
            "round {round}: {outcomes:?}"
        );
    }

    assert_eq!(harness.claim_keys(ClaimKind::Email).len(), 16);
    assert_eq!(harness.claim_keys(ClaimKind::ScreenName).len(), 16);
}
