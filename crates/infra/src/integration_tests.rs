//! Integration tests for the full ledger pipeline.
//!
//! Tests: Batch → LedgerStore (atomic scope) → EventBus
//!
//! Verifies:
//! - Pooled allocation and the Secondary ceiling
//! - Credit and transfer guards
//! - All-or-nothing batches (state and notifications)
//! - Deletion reconciliation and idempotent recompute
//! - Per-owner serialization under concurrent submitters

use std::sync::Arc;

use proptest::prelude::*;

use fintrack_accounts::{Account, AccountStatus, PoolConfig};
use fintrack_core::{AccountId, EntryId, Money, OwnerId, Role};
use fintrack_events::{EventBus, EventEnvelope, InMemoryEventBus};
use fintrack_ledger::{
    EntryFilter, EntryKind, EntryMetadataPatch, LedgerError, LedgerEvent, OperationRequest, signed_effect,
};

use crate::config::LedgerConfig;
use crate::service::{LedgerService, ServiceError};
use crate::store::{InMemoryLedgerStore, LedgerStore};

type Bus = InMemoryEventBus<EventEnvelope<LedgerEvent>>;
type Service = LedgerService<Arc<InMemoryLedgerStore>, Arc<Bus>>;

fn cents(c: i64) -> Money {
    Money::from_cents(c)
}

fn user() -> Role {
    Role::new("user")
}

fn admin() -> Role {
    Role::new("admin")
}

fn setup(config: LedgerConfig) -> (Service, Arc<InMemoryLedgerStore>, Arc<Bus>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let bus: Arc<Bus> = Arc::new(InMemoryEventBus::new());
    let service = LedgerService::new(store.clone(), bus.clone(), config);
    (service, store, bus)
}

fn open_debit(service: &Service, owner: OwnerId, name: &str) -> AccountId {
    let id = AccountId::new();
    service
        .open_account(Account::new_debit(id, owner, name, Money::ZERO))
        .unwrap();
    id
}

fn open_credit(service: &Service, owner: OwnerId, name: &str, limit: Money) -> AccountId {
    let id = AccountId::new();
    service
        .open_account(Account::new_credit(id, owner, name, limit, Money::ZERO))
        .unwrap();
    id
}

fn value_of(service: &Service, owner: OwnerId, id: AccountId) -> Money {
    service.accounts(owner).unwrap().get(id).unwrap().tracked_value()
}

fn rejection(err: ServiceError) -> (usize, LedgerError) {
    match err {
        ServiceError::Rejected(batch) => (batch.index, batch.error),
        other => panic!("expected a rejected batch, got {other:?}"),
    }
}

struct PoolFixture {
    service: Service,
    owner: OwnerId,
    primary: AccountId,
    secondary: AccountId,
    cap: Money,
}

fn pool_fixture(cap: Money) -> PoolFixture {
    let owner = OwnerId::new();
    let primary = AccountId::new();
    let secondary = AccountId::new();
    let config = LedgerConfig::default().with_pool(PoolConfig::new(admin(), primary, secondary).with_secondary_cap(cap));
    let (service, _store, _bus) = setup(config);
    service
        .open_account(Account::new_debit(primary, owner, "Main", Money::ZERO))
        .unwrap();
    service
        .open_account(Account::new_debit(secondary, owner, "Reserve", Money::ZERO))
        .unwrap();
    PoolFixture {
        service,
        owner,
        primary,
        secondary,
        cap,
    }
}

#[test]
fn pooled_expense_draws_primary_first_then_secondary() {
    let f = pool_fixture(cents(5_000_000));
    f.service
        .submit_batch(
            f.owner,
            &admin(),
            &[
                OperationRequest::income(f.primary, cents(10_000)),
                OperationRequest::income(f.secondary, cents(30_000)),
            ],
        )
        .unwrap();

    let entries = f
        .service
        .submit_batch(f.owner, &admin(), &[OperationRequest::expense(f.primary, cents(25_000))])
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].source_account_id, Some(f.primary));
    assert_eq!(entries[0].amount, cents(10_000));
    assert_eq!(entries[0].description, "Expense from Main");
    assert_eq!(entries[1].source_account_id, Some(f.secondary));
    assert_eq!(entries[1].amount, cents(15_000));
    assert_eq!(entries[1].description, "Expense from Reserve");

    assert_eq!(value_of(&f.service, f.owner, f.primary), Money::ZERO);
    assert_eq!(value_of(&f.service, f.owner, f.secondary), cents(15_000));
}

#[test]
fn pooled_expense_beyond_combined_funds_is_rejected() {
    let f = pool_fixture(cents(5_000_000));
    f.service
        .submit_batch(
            f.owner,
            &admin(),
            &[
                OperationRequest::income(f.primary, cents(1_000)),
                OperationRequest::income(f.secondary, cents(2_000)),
            ],
        )
        .unwrap();

    let err = f
        .service
        .submit_batch(f.owner, &admin(), &[OperationRequest::expense(f.primary, cents(3_001))])
        .unwrap_err();
    let (index, error) = rejection(err);
    assert_eq!(index, 0);
    assert!(matches!(
        error,
        LedgerError::InsufficientPoolFunds { available, requested } if available == cents(3_000) && requested == cents(3_001)
    ));
    assert_eq!(value_of(&f.service, f.owner, f.primary), cents(1_000));
    assert_eq!(value_of(&f.service, f.owner, f.secondary), cents(2_000));
}

#[test]
fn secondary_ceiling_applies_to_income_and_transfers() {
    let f = pool_fixture(cents(10_000));

    let top_up = f
        .service
        .submit_batch(f.owner, &admin(), &[OperationRequest::income(f.secondary, cents(8_000))])
        .unwrap();
    assert_eq!(top_up[0].description, "Pool top-up: Income");

    let err = f
        .service
        .submit_batch(f.owner, &admin(), &[OperationRequest::income(f.secondary, cents(2_001))])
        .unwrap_err();
    assert!(matches!(
        rejection(err).1,
        LedgerError::PoolCapacityExceeded { headroom, .. } if headroom == cents(2_000)
    ));

    f.service
        .submit_batch(f.owner, &admin(), &[OperationRequest::income(f.primary, cents(5_000))])
        .unwrap();
    let err = f
        .service
        .submit_batch(
            f.owner,
            &admin(),
            &[OperationRequest::transfer(f.primary, f.secondary, cents(2_500))],
        )
        .unwrap_err();
    assert!(matches!(rejection(err).1, LedgerError::PoolCapacityExceeded { .. }));

    // Exactly at the ceiling is fine.
    f.service
        .submit_batch(
            f.owner,
            &admin(),
            &[OperationRequest::transfer(f.primary, f.secondary, cents(2_000))],
        )
        .unwrap();
    assert_eq!(value_of(&f.service, f.owner, f.secondary), f.cap);
}

#[test]
fn privileged_income_must_target_the_pool() {
    let f = pool_fixture(cents(5_000_000));
    let other = open_debit(&f.service, f.owner, "Side");
    let err = f
        .service
        .submit_batch(f.owner, &admin(), &[OperationRequest::income(other, cents(100))])
        .unwrap_err();
    assert!(matches!(rejection(err).1, LedgerError::IncomeOutsidePool(id) if id == other));
}

#[test]
fn credit_account_cannot_exceed_limit_or_be_overpaid() {
    let owner = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let card = open_credit(&service, owner, "Card", cents(50_000));

    service
        .submit_batch(
            owner,
            &user(),
            &[
                OperationRequest::income(cash, cents(100_000)),
                OperationRequest::expense(card, cents(40_000)),
            ],
        )
        .unwrap();
    assert_eq!(value_of(&service, owner, card), cents(40_000));

    let err = service
        .submit_batch(owner, &user(), &[OperationRequest::expense(card, cents(10_001))])
        .unwrap_err();
    assert!(matches!(
        rejection(err).1,
        LedgerError::InsufficientCredit { available, .. } if available == cents(10_000)
    ));

    let err = service
        .submit_batch(owner, &user(), &[OperationRequest::transfer(cash, card, cents(40_001))])
        .unwrap_err();
    assert!(matches!(rejection(err).1, LedgerError::CreditOverpayment { .. }));

    service
        .submit_batch(owner, &user(), &[OperationRequest::transfer(cash, card, cents(40_000))])
        .unwrap();
    assert_eq!(value_of(&service, owner, card), Money::ZERO);
    assert_eq!(value_of(&service, owner, cash), cents(60_000));
}

#[test]
fn failing_operation_aborts_the_whole_batch() {
    let owner = OwnerId::new();
    let (service, _store, bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let savings = open_debit(&service, owner, "Savings");
    let sub = bus.subscribe();

    let err = service
        .submit_batch(
            owner,
            &user(),
            &[
                OperationRequest::income(cash, cents(10_000)),
                OperationRequest::transfer(cash, savings, cents(5_000)),
                OperationRequest::expense(savings, cents(5_001)),
            ],
        )
        .unwrap_err();

    let (index, error) = rejection(err);
    assert_eq!(index, 2);
    assert_eq!(error.code(), "insufficient_funds");

    assert_eq!(value_of(&service, owner, cash), Money::ZERO);
    assert_eq!(value_of(&service, owner, savings), Money::ZERO);
    assert_eq!(service.list_entries(owner, &EntryFilter::default()).unwrap().total, 0);
    assert!(sub.try_recv().is_err(), "a rejected batch must not notify");
}

#[test]
fn transfer_guards() {
    let alice = OwnerId::new();
    let bob = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, alice, "Cash");
    let frozen = AccountId::new();
    service
        .open_account(Account::new_debit(frozen, alice, "Old", Money::ZERO).with_status(AccountStatus::Frozen))
        .unwrap();
    let bobs = open_debit(&service, bob, "Bob");
    service
        .submit_batch(alice, &user(), &[OperationRequest::income(cash, cents(1_000))])
        .unwrap();

    let cases = [
        (OperationRequest::transfer(cash, cash, cents(100)), "same_account_transfer"),
        (OperationRequest::transfer(cash, bobs, cents(100)), "cross_owner_transfer"),
        (OperationRequest::transfer(cash, AccountId::new(), cents(100)), "account_not_found"),
        (OperationRequest::transfer(bobs, cash, cents(100)), "account_not_found"),
        (OperationRequest::transfer(cash, frozen, cents(100)), "account_inactive"),
        (OperationRequest::transfer(cash, frozen, cents(0)), "invalid_amount"),
    ];
    for (op, code) in cases {
        let err = service.submit_batch(alice, &user(), &[op]).unwrap_err();
        assert_eq!(err.code(), code);
    }

    assert_eq!(value_of(&service, alice, cash), cents(1_000));
    assert_eq!(value_of(&service, bob, bobs), Money::ZERO);
}

#[test]
fn unknown_kind_names_the_operation_index() {
    let owner = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let mut refund = OperationRequest::income(cash, cents(100));
    refund.kind = "refund".to_string();

    let err = service
        .submit_batch(owner, &user(), &[OperationRequest::income(cash, cents(100)), refund])
        .unwrap_err();
    let (index, error) = rejection(err);
    assert_eq!(index, 1);
    assert!(matches!(error, LedgerError::UnknownOperationKind(k) if k == "refund"));
}

#[test]
fn deleting_an_entry_recomputes_referenced_accounts() {
    let owner = OwnerId::new();
    let (service, _store, bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let card = open_credit(&service, owner, "Card", cents(50_000));

    let recorded = service
        .submit_batch(
            owner,
            &user(),
            &[
                OperationRequest::income(cash, cents(10_000)),
                OperationRequest::expense(card, cents(20_000)),
                OperationRequest::transfer(cash, card, cents(3_000)),
            ],
        )
        .unwrap();
    let sub = bus.subscribe();

    let results = service.delete_entry(owner, &user(), recorded[2].id).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(value_of(&service, owner, cash), cents(10_000));
    assert_eq!(value_of(&service, owner, card), cents(20_000));

    match sub.try_recv().unwrap().into_payload() {
        LedgerEvent::EntryDeleted { entry, recomputed, .. } => {
            assert_eq!(entry.id, recorded[2].id);
            assert_eq!(recomputed.len(), 2);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Nothing else references the card: it falls back to zero debt.
    service.delete_entry(owner, &user(), recorded[1].id).unwrap();
    assert_eq!(value_of(&service, owner, card), Money::ZERO);
}

#[test]
fn deleting_spent_income_clamps_and_recompute_is_idempotent() {
    let owner = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let recorded = service
        .submit_batch(
            owner,
            &user(),
            &[
                OperationRequest::income(cash, cents(10_000)),
                OperationRequest::expense(cash, cents(4_000)),
            ],
        )
        .unwrap();

    let results = service.delete_entry(owner, &user(), recorded[0].id).unwrap();
    assert!(results[0].clamped);
    assert_eq!(value_of(&service, owner, cash), Money::ZERO);

    let first = service.recompute_account(owner, &user(), cash).unwrap();
    let second = service.recompute_account(owner, &user(), cash).unwrap();
    assert_eq!(first.value, first.previous);
    assert_eq!(second.value, second.previous);
}

#[test]
fn deletion_that_would_push_debt_over_limit_is_refused() {
    let owner = OwnerId::new();
    let (service, _store, bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let card = open_credit(&service, owner, "Card", cents(10_000));
    service
        .submit_batch(owner, &user(), &[OperationRequest::income(cash, cents(20_000))])
        .unwrap();
    service
        .submit_batch(owner, &user(), &[OperationRequest::expense(card, cents(10_000))])
        .unwrap();
    let payment = service
        .submit_batch(owner, &user(), &[OperationRequest::transfer(cash, card, cents(5_000))])
        .unwrap();
    service
        .submit_batch(owner, &user(), &[OperationRequest::expense(card, cents(5_000))])
        .unwrap();

    let sub = bus.subscribe();
    let err = service.delete_entry(owner, &user(), payment[0].id).unwrap_err();
    assert_eq!(err.code(), "debt_exceeds_limit");
    assert_eq!(err.http_status(), 422);
    assert!(sub.try_recv().is_err());

    let accounts = service.accounts(owner).unwrap();
    let stored = accounts.get(card).unwrap();
    assert_eq!(stored.tracked_value(), cents(10_000));
    assert!(stored.validate().is_ok());
    assert_eq!(service.list_entries(owner, &EntryFilter::default()).unwrap().total, 4);

    service
        .submit_batch(owner, &user(), &[OperationRequest::transfer(cash, card, cents(3_000))])
        .unwrap();
    assert_eq!(value_of(&service, owner, card), cents(7_000));
    assert_eq!(value_of(&service, owner, cash), cents(12_000));
}

#[test]
fn secondary_without_entries_tops_up_to_cap_for_privileged_role() {
    let f = pool_fixture(cents(5_000_000));
    let recorded = f
        .service
        .submit_batch(f.owner, &admin(), &[OperationRequest::income(f.secondary, cents(1_000))])
        .unwrap();

    f.service.delete_entry(f.owner, &admin(), recorded[0].id).unwrap();
    assert_eq!(value_of(&f.service, f.owner, f.secondary), f.cap);
}

#[test]
fn entries_of_other_owners_are_not_found() {
    let alice = OwnerId::new();
    let bob = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, alice, "Cash");
    let recorded = service
        .submit_batch(alice, &user(), &[OperationRequest::income(cash, cents(500))])
        .unwrap();

    let err = service.delete_entry(bob, &user(), recorded[0].id).unwrap_err();
    assert!(matches!(err, ServiceError::EntryNotFound(id) if id == recorded[0].id));
    let err = service.delete_entry(alice, &user(), EntryId::new()).unwrap_err();
    assert_eq!(err.http_status(), 404);
    assert_eq!(value_of(&service, alice, cash), cents(500));
}

#[test]
fn annotate_changes_metadata_only() {
    let owner = OwnerId::new();
    let (service, _store, bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let recorded = service
        .submit_batch(owner, &user(), &[OperationRequest::income(cash, cents(2_500))])
        .unwrap();
    let sub = bus.subscribe();

    let patch = EntryMetadataPatch {
        description: Some("Salary".to_string()),
        category: Some("Work".to_string()),
        occurred_at: None,
    };
    let updated = service.annotate_entry(owner, recorded[0].id, &patch).unwrap();
    assert_eq!(updated.description, "Salary");
    assert_eq!(updated.category, "Work");
    assert_eq!(updated.amount, recorded[0].amount);
    assert_eq!(updated.destination_account_id, Some(cash));
    assert_eq!(updated.occurred_at, recorded[0].occurred_at);

    let listed = service.list_entries(owner, &EntryFilter::default()).unwrap();
    assert_eq!(listed.items[0].description, "Salary");
    assert_eq!(value_of(&service, owner, cash), cents(2_500));
    assert!(matches!(
        sub.try_recv().unwrap().payload(),
        LedgerEvent::EntryAnnotated { .. }
    ));
}

#[test]
fn listing_filters_and_paginates_newest_first() {
    let owner = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let base = chrono::Utc::now();

    let ops: Vec<OperationRequest> = (0..12)
        .map(|i| {
            let op = if i % 3 == 2 {
                OperationRequest::expense(cash, cents(100)).with_category("Food")
            } else {
                OperationRequest::income(cash, cents(1_000))
            };
            op.with_occurred_at(base + chrono::Duration::minutes(i))
        })
        .collect();
    service.submit_batch(owner, &user(), &ops).unwrap();

    let first = service.list_entries(owner, &EntryFilter::default()).unwrap();
    assert_eq!(first.total, 12);
    assert_eq!(first.items.len(), 10);
    assert!(first.items.windows(2).all(|w| w[0].occurred_at >= w[1].occurred_at));

    let second = service
        .list_entries(
            owner,
            &EntryFilter {
                page: 2,
                ..EntryFilter::default()
            },
        )
        .unwrap();
    assert_eq!(second.items.len(), 2);

    let food = service
        .list_entries(
            owner,
            &EntryFilter {
                kind: Some(EntryKind::Expense),
                category: Some("Food".to_string()),
                ..EntryFilter::default()
            },
        )
        .unwrap();
    assert_eq!(food.total, 4);

    assert_eq!(service.list_entries(OwnerId::new(), &EntryFilter::default()).unwrap().total, 0);
}

#[test]
fn committed_batches_are_published_to_the_owner() {
    let owner = OwnerId::new();
    let (service, _store, bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    let sub = bus.subscribe();

    let entries = service
        .submit_batch(owner, &user(), &[OperationRequest::income(cash, cents(700))])
        .unwrap();

    let envelope = sub.try_recv().unwrap();
    assert_eq!(envelope.owner_id(), owner);
    assert_eq!(envelope.event_type(), "ledger.entries_recorded");
    match envelope.into_payload() {
        LedgerEvent::EntriesRecorded {
            entries: published,
            accounts,
            ..
        } => {
            assert_eq!(published, entries);
            assert_eq!(accounts.len(), 1);
            assert_eq!(accounts[0].tracked_value(), cents(700));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn concurrent_batches_for_one_owner_never_overdraw() {
    let owner = OwnerId::new();
    let (service, _store, _bus) = setup(LedgerConfig::default());
    let cash = open_debit(&service, owner, "Cash");
    service
        .submit_batch(owner, &user(), &[OperationRequest::income(cash, cents(10_000))])
        .unwrap();

    let service = Arc::new(service);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                let mut accepted = 0u32;
                for _ in 0..25 {
                    match service.submit_batch(owner, &user(), &[OperationRequest::expense(cash, cents(100))]) {
                        Ok(_) => accepted += 1,
                        Err(err) => assert_eq!(err.code(), "insufficient_funds"),
                    }
                }
                accepted
            })
        })
        .collect();

    let accepted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(accepted, 100);
    assert_eq!(value_of(&service, owner, cash), Money::ZERO);
    assert_eq!(service.list_entries(owner, &EntryFilter::default()).unwrap().total, 101);
}

#[derive(Debug, Clone)]
enum Step {
    Submit(Vec<(u8, u8, u8, i64)>),
    Delete(prop::sample::Index),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => prop::collection::vec((0u8..3, 0u8..3, 0u8..3, 1i64..20_000), 1..4).prop_map(Step::Submit),
        2 => (1i64..15_000).prop_map(|c| Step::Submit(vec![(1, 2, 0, c)])),
        2 => (0u8..2, 1i64..15_000).prop_map(|(from, c)| Step::Submit(vec![(2, from, 2, c)])),
        2 => any::<prop::sample::Index>().prop_map(Step::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Property: after any mix of batches, card spends, paydowns and
    /// deletions, every stored account is within bounds, recompute is
    /// idempotent, and (absent clamping) the stored value equals the signed
    /// sum of its completed entries.
    #[test]
    fn stored_values_always_match_history(steps in prop::collection::vec(step_strategy(), 1..12)) {
        let owner = OwnerId::new();
        let (service, store, _bus) = setup(LedgerConfig::default());
        let accounts = [
            open_debit(&service, owner, "Cash"),
            open_debit(&service, owner, "Savings"),
            open_credit(&service, owner, "Card", cents(30_000)),
        ];
        let mut clamped = false;

        for step in steps {
            match step {
                Step::Submit(ops) => {
                    let ops: Vec<OperationRequest> = ops
                        .into_iter()
                        .map(|(kind, a, b, c)| {
                            let (a, b) = (accounts[a as usize], accounts[b as usize]);
                            match kind {
                                0 => OperationRequest::income(a, cents(c)),
                                1 => OperationRequest::expense(a, cents(c)),
                                _ => OperationRequest::transfer(a, b, cents(c)),
                            }
                        })
                        .collect();
                    let before = service.accounts(owner).unwrap();
                    if service.submit_batch(owner, &user(), &ops).is_err() {
                        prop_assert_eq!(service.accounts(owner).unwrap(), before);
                    }
                }
                Step::Delete(victim) => {
                    let all = service
                        .list_entries(owner, &EntryFilter { limit: 500, ..EntryFilter::default() })
                        .unwrap();
                    if all.items.is_empty() {
                        continue;
                    }
                    let entry = &all.items[victim.index(all.items.len())];
                    let before = service.accounts(owner).unwrap();
                    match service.delete_entry(owner, &user(), entry.id) {
                        Ok(results) => clamped |= results.iter().any(|r| r.clamped),
                        Err(err) => {
                            prop_assert_eq!(err.code(), "debt_exceeds_limit");
                            prop_assert_eq!(service.accounts(owner).unwrap(), before);
                        }
                    }
                }
            }
        }

        let snapshot = service.accounts(owner).unwrap();
        let history: Vec<_> = store
            .transact::<_, crate::store::StoreError, _>(owner, |tx| tx.entries_referencing(&accounts))
            .unwrap();

        for account in snapshot.iter() {
            prop_assert!(!account.tracked_value().is_negative());
            prop_assert!(account.validate().is_ok(), "stored account out of bounds: {:?}", account);
            let recomputed = service.recompute_account(owner, &user(), account.id).unwrap();
            let again = service.recompute_account(owner, &user(), account.id).unwrap();
            prop_assert_eq!(again.value, again.previous);
            prop_assert_eq!(again.value, recomputed.value);

            if !clamped {
                prop_assert_eq!(recomputed.value, recomputed.previous);
                let mut sum = Money::ZERO;
                for entry in &history {
                    if let Some(delta) = signed_effect(entry, account) {
                        sum = sum.checked_add(delta).unwrap();
                    }
                }
                prop_assert_eq!(sum, account.tracked_value());
            }
        }
    }
}
