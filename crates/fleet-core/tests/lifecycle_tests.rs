use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fleet_assign::{
    Assignment, AssignmentController, AssignmentError, AssignmentFilter, AssignmentLedger,
    AssignmentState, Equipment, ImportRecord, InMemoryCatalog, InMemoryLedger, LedgerError,
    NewAssignment, OperationalStatus, Project, TermsPatch, TransitionRequest,
};
use fleet_cost::{Retribution, RetributionMode, compute_cost, round_currency};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn catalog() -> Arc<InMemoryCatalog> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.upsert_project(Project::internal("P1", dec!(1000)));
    catalog.upsert_project(Project::external("P2", None));
    catalog.upsert_project(Project::internal("P3", dec!(400)));
    for id in ["E1", "E2", "E3", "E4", "E5"] {
        catalog.upsert_equipment(Equipment::operative(id));
    }
    catalog.upsert_equipment(Equipment::new("E-OOS", OperationalStatus::OutOfService));
    catalog
}

fn controller() -> AssignmentController {
    let catalog = catalog();
    AssignmentController::new(Arc::new(InMemoryLedger::new()), catalog.clone(), catalog)
}

fn request(equipment: &str, project: &str, mode: RetributionMode, value: Decimal) -> NewAssignment {
    NewAssignment {
        equipment_id: Some(equipment.to_string()),
        project_id: Some(project.to_string()),
        cost_center_id: Some("CC-100".to_string()),
        start_date: Some(date(2026, 3, 1)),
        retribution_mode: Some(mode),
        retribution_value: Some(value),
        estimated_hours: Some(dec!(100)),
        ..NewAssignment::default()
    }
}

fn create_p1(controller: &AssignmentController) -> Assignment {
    controller
        .create(request("E1", "P1", RetributionMode::Percentage, dec!(15)), now())
        .unwrap()
}

fn validation_fields(err: AssignmentError) -> Vec<String> {
    match err {
        AssignmentError::Validation(errors) => {
            errors.into_vec().into_iter().map(|e| e.field).collect()
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn internal_percentage_assignment_costs_fifteen_thousand() {
    let controller = controller();
    let created = create_p1(&controller);

    assert_eq!(created.state, AssignmentState::Active);
    assert_eq!(created.total_cost, dec!(15000.00));
    assert_eq!(created.total_cost.scale(), 2);
    assert_eq!(created.created_at, now());
    assert!(!created.maintenance_validated);
}

#[test]
fn second_create_for_busy_equipment_conflicts() {
    let controller = controller();
    let first = create_p1(&controller);

    let err = controller
        .create(request("E1", "P3", RetributionMode::Percentage, dec!(10)), now())
        .unwrap_err();
    match err {
        AssignmentError::EquipmentAlreadyAssigned {
            equipment_id,
            active_id,
        } => {
            assert_eq!(equipment_id, "E1");
            assert_eq!(active_id, first.id);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn actual_hours_above_estimate_drive_cost() {
    let controller = controller();
    let created = create_p1(&controller);

    let later = now() + Duration::hours(4);
    let updated = controller
        .update_terms(
            created.id,
            TermsPatch {
                actual_hours: Some(dec!(120)),
                ..TermsPatch::default()
            },
            later,
        )
        .unwrap();
    assert_eq!(updated.total_cost, dec!(18000.00));
    assert_eq!(updated.updated_at, later);
    assert_eq!(controller.get(created.id).unwrap(), updated);
}

#[test]
fn finalize_defaults_to_today_and_freezes_record() {
    let controller = controller();
    let created = create_p1(&controller);

    let finalized = controller
        .transition(
            created.id,
            TransitionRequest::to(AssignmentState::Finalized),
            now(),
        )
        .unwrap();
    assert_eq!(finalized.state, AssignmentState::Finalized);
    assert_eq!(finalized.actual_end_date, Some(now().date_naive()));

    let err = controller
        .update_terms(
            created.id,
            TermsPatch {
                notes: Some("late note".into()),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        AssignmentError::InvalidState {
            state: AssignmentState::Finalized,
            ..
        }
    ));
}

#[test]
fn percentage_without_cost_basis_fails_validation() {
    let controller = controller();
    let err = controller
        .create(request("E1", "P2", RetributionMode::Percentage, dec!(15)), now())
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["retributionMode".to_string()]);
    assert!(controller.list(&AssignmentFilter::default()).unwrap().is_empty());
}

#[test]
fn reactivating_suspended_assignment_conflicts_with_new_holder() {
    let controller = controller();
    let first = create_p1(&controller);
    controller
        .transition(
            first.id,
            TransitionRequest::to(AssignmentState::Suspended),
            now(),
        )
        .unwrap();

    let second = controller
        .create(request("E1", "P3", RetributionMode::Percentage, dec!(20)), now())
        .unwrap();

    let err = controller
        .transition(first.id, TransitionRequest::to(AssignmentState::Active), now())
        .unwrap_err();
    assert!(matches!(
        err,
        AssignmentError::EquipmentAlreadyAssigned { active_id, .. } if active_id == second.id
    ));
    assert_eq!(
        controller.get(first.id).unwrap().state,
        AssignmentState::Suspended
    );
}

#[test]
fn internal_percentage_band_is_inclusive() {
    let controller = controller();
    for (equipment, value) in [("E1", dec!(0)), ("E2", dec!(51))] {
        let err = controller
            .create(request(equipment, "P1", RetributionMode::Percentage, value), now())
            .unwrap_err();
        assert_eq!(validation_fields(err), vec!["retributionValue".to_string()]);
    }
    for (equipment, value) in [("E3", dec!(1)), ("E4", dec!(50))] {
        controller
            .create(request(equipment, "P1", RetributionMode::Percentage, value), now())
            .unwrap();
    }
}

#[test]
fn fixed_rate_must_be_positive() {
    let controller = controller();
    for (equipment, value) in [("E1", dec!(0)), ("E2", dec!(-5))] {
        let err = controller
            .create(request(equipment, "P2", RetributionMode::FixedRate, value), now())
            .unwrap_err();
        assert_eq!(validation_fields(err), vec!["retributionValue".to_string()]);
    }
    let created = controller
        .create(request("E3", "P2", RetributionMode::FixedRate, dec!(0.01)), now())
        .unwrap();
    assert_eq!(created.total_cost, dec!(1.00));
}

#[test]
fn terminal_records_reject_every_update() {
    let controller = controller();
    let finalized = create_p1(&controller);
    controller
        .transition(
            finalized.id,
            TransitionRequest::finalize_on(date(2026, 3, 20)),
            now(),
        )
        .unwrap();
    let cancelled = controller
        .create(request("E2", "P2", RetributionMode::FixedRate, dec!(80)), now())
        .unwrap();
    controller
        .transition(
            cancelled.id,
            TransitionRequest::to(AssignmentState::Cancelled),
            now(),
        )
        .unwrap();

    let patches = [
        TermsPatch::default(),
        TermsPatch {
            actual_hours: Some(dec!(10)),
            ..TermsPatch::default()
        },
        TermsPatch {
            retribution_mode: Some(RetributionMode::FixedRate),
            retribution_value: Some(dec!(5)),
            ..TermsPatch::default()
        },
        TermsPatch {
            maintenance_validated: Some(true),
            ..TermsPatch::default()
        },
    ];
    for id in [finalized.id, cancelled.id] {
        let before = controller.get(id).unwrap();
        for patch in patches.clone() {
            let err = controller.update_terms(id, patch, now()).unwrap_err();
            assert!(matches!(err, AssignmentError::InvalidState { .. }), "{err:?}");
        }
        assert_eq!(controller.get(id).unwrap(), before);
    }
}

#[test]
fn terminal_states_have_no_outgoing_transitions() {
    let controller = controller();
    let created = create_p1(&controller);
    controller
        .transition(
            created.id,
            TransitionRequest::to(AssignmentState::Cancelled),
            now(),
        )
        .unwrap();
    for target in AssignmentState::ALL {
        let err = controller
            .transition(created.id, TransitionRequest::to(target), now())
            .unwrap_err();
        assert!(
            matches!(err, AssignmentError::InvalidTransition { from: AssignmentState::Cancelled, .. }),
            "{err:?}"
        );
    }
    let cancelled = controller.get(created.id).unwrap();
    assert_eq!(cancelled.actual_end_date, None);
}

#[test]
fn stored_cost_matches_policy_output() {
    let controller = controller();
    let mut input = request("E1", "P2", RetributionMode::FixedRate, dec!(87.5));
    input.estimated_hours = Some(dec!(12.345));
    let created = controller.create(input, now()).unwrap();

    let project = Project::external("P2", None);
    let expected = round_currency(
        compute_cost(&created.retribution, dec!(12.345), &project.pricing()).unwrap(),
    );
    assert_eq!(created.total_cost, expected);
    assert_eq!(created.total_cost, dec!(1080.19));
    assert_eq!(controller.get(created.id).unwrap().total_cost, expected);
}

#[test]
fn concurrent_creates_leave_one_active_assignment() {
    let controller = controller();
    let threads = 16;
    let barrier = Barrier::new(threads);

    let outcomes: Vec<Result<Assignment, AssignmentError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|n| {
                let controller = controller.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    let mut input =
                        request("E1", "P1", RetributionMode::Percentage, dec!(15));
                    input.cost_center_id = Some(format!("CC-{n}"));
                    barrier.wait();
                    controller.create(input, now())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(
                matches!(err, AssignmentError::EquipmentAlreadyAssigned { .. }),
                "{err:?}"
            );
        }
    }
    let active = controller
        .list(&AssignmentFilter {
            equipment_id: Some("E1".into()),
            state: Some(AssignmentState::Active),
            ..AssignmentFilter::default()
        })
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[test]
fn missing_terms_come_from_configured_defaults() {
    let controller = controller().with_defaults(fleet_cost::RetributionDefaults {
        percentage: dec!(12),
        fixed_rate: dec!(90),
    });
    let mut input = request("E1", "P1", RetributionMode::Percentage, dec!(1));
    input.retribution_mode = None;
    input.retribution_value = None;
    let internal = controller.create(input, now()).unwrap();
    assert_eq!(internal.retribution, Retribution::Percentage(dec!(12)));
    assert_eq!(internal.total_cost, dec!(12000.00));

    let mut input = request("E2", "P2", RetributionMode::FixedRate, dec!(1));
    input.retribution_value = None;
    input.estimated_hours = None;
    let external = controller.create(input, now()).unwrap();
    assert_eq!(external.retribution, Retribution::FixedRate(dec!(90)));
    assert_eq!(external.estimated_hours, Decimal::ZERO);
    assert_eq!(external.total_cost, dec!(0.00));

    assert_eq!(
        controller.suggest_terms("P3").unwrap(),
        Retribution::Percentage(dec!(12))
    );
}

#[test]
fn changing_mode_without_value_uses_mode_default() {
    let controller = controller();
    let created = create_p1(&controller);
    let updated = controller
        .update_terms(
            created.id,
            TermsPatch {
                retribution_mode: Some(RetributionMode::FixedRate),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap();
    assert_eq!(updated.retribution, Retribution::FixedRate(dec!(100)));
    assert_eq!(updated.total_cost, dec!(10000.00));
}

#[test]
fn client_total_cost_is_ignored_and_hours_may_decrease() {
    let controller = controller();
    let created = create_p1(&controller);
    controller
        .update_terms(
            created.id,
            TermsPatch {
                actual_hours: Some(dec!(150)),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap();
    let updated = controller
        .update_terms(
            created.id,
            TermsPatch {
                actual_hours: Some(dec!(40)),
                total_cost: Some(dec!(1)),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap();
    assert_eq!(updated.actual_hours, dec!(40));
    assert_eq!(updated.total_cost, dec!(15000.00));
}

#[test]
fn update_collects_every_invalid_field() {
    let controller = controller();
    let created = create_p1(&controller);
    let err = controller
        .update_terms(
            created.id,
            TermsPatch {
                expected_end_date: Some(date(2026, 2, 1)),
                retribution_value: Some(dec!(75)),
                estimated_hours: Some(dec!(-1)),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap_err();
    let fields = validation_fields(err);
    for field in ["expectedEndDate", "retributionValue", "estimatedHours"] {
        assert!(fields.iter().any(|f| f == field), "missing {field}: {fields:?}");
    }
    assert_eq!(controller.get(created.id).unwrap(), created);
}

#[test]
fn maintenance_gate_cannot_be_reset() {
    let controller = controller();
    let created = create_p1(&controller);
    let validated = controller
        .update_terms(
            created.id,
            TermsPatch {
                maintenance_validated: Some(true),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap();
    assert!(validated.maintenance_validated);

    let err = controller
        .update_terms(
            created.id,
            TermsPatch {
                maintenance_validated: Some(false),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["maintenanceValidated".to_string()]);
}

#[test]
fn end_dates_are_checked_on_transition() {
    let controller = controller();
    let created = create_p1(&controller);

    let err = controller
        .transition(
            created.id,
            TransitionRequest {
                target_state: AssignmentState::Suspended,
                actual_end_date: Some(date(2026, 3, 5)),
            },
            now(),
        )
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["actualEndDate".to_string()]);

    let err = controller
        .transition(
            created.id,
            TransitionRequest::finalize_on(date(2026, 2, 28)),
            now(),
        )
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["actualEndDate".to_string()]);

    let finalized = controller
        .transition(
            created.id,
            TransitionRequest::finalize_on(date(2026, 3, 1)),
            now(),
        )
        .unwrap();
    assert_eq!(finalized.actual_end_date, Some(date(2026, 3, 1)));
}

#[test]
fn equipment_becomes_free_after_finalize() {
    let controller = controller();
    let first = create_p1(&controller);
    controller
        .transition(first.id, TransitionRequest::to(AssignmentState::Finalized), now())
        .unwrap();
    let second = controller
        .create(request("E1", "P3", RetributionMode::Percentage, dec!(20)), now())
        .unwrap();
    assert_eq!(second.state, AssignmentState::Active);
}

#[test]
fn out_of_service_equipment_cannot_be_reactivated() {
    let catalog = catalog();
    let controller =
        AssignmentController::new(Arc::new(InMemoryLedger::new()), catalog.clone(), catalog.clone());
    let created = controller
        .create(request("E5", "P1", RetributionMode::Percentage, dec!(15)), now())
        .unwrap();
    controller
        .transition(created.id, TransitionRequest::to(AssignmentState::Suspended), now())
        .unwrap();
    catalog.upsert_equipment(Equipment::new("E5", OperationalStatus::OutOfService));

    let err = controller
        .transition(created.id, TransitionRequest::to(AssignmentState::Active), now())
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["equipmentId".to_string()]);
}

#[test]
fn idempotency_key_replays_first_create() {
    let controller = controller();
    let mut input = request("E1", "P1", RetributionMode::Percentage, dec!(15));
    input.idempotency_key = Some("req-42".into());
    let first = controller.create(input.clone(), now()).unwrap();

    input.retribution_value = Some(dec!(30));
    let replayed = controller
        .create(input, now() + Duration::minutes(1))
        .unwrap();
    assert_eq!(replayed, first);
    assert_eq!(
        controller.list(&AssignmentFilter::default()).unwrap().len(),
        1
    );
}

#[test]
fn listing_filters_and_orders_by_creation() {
    let controller = controller();
    let late = controller
        .create(
            request("E2", "P1", RetributionMode::Percentage, dec!(15)),
            now() + Duration::hours(1),
        )
        .unwrap();
    let early = create_p1(&controller);
    let external = controller
        .create(request("E3", "P2", RetributionMode::FixedRate, dec!(50)), now())
        .unwrap();

    let all = controller.list(&AssignmentFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.last().unwrap().id, late.id);

    let by_project = controller
        .list(&AssignmentFilter {
            project_id: Some("P1".into()),
            ..AssignmentFilter::default()
        })
        .unwrap();
    let ids: Vec<Uuid> = by_project.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![early.id, late.id]);

    let by_equipment = controller.list(&AssignmentFilter::by_equipment("E3")).unwrap();
    assert_eq!(by_equipment, vec![external]);
}

fn import_record(state: AssignmentState) -> ImportRecord {
    ImportRecord {
        id: None,
        assignment: request("E1", "P2", RetributionMode::FixedRate, dec!(50)),
        state,
        actual_hours: Some(dec!(140)),
        actual_end_date: None,
        maintenance_validated: true,
        created_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()),
    }
}

#[test]
fn import_accepts_historical_states_without_exclusivity() {
    let controller = controller();
    create_p1(&controller);

    let mut record = import_record(AssignmentState::Finalized);
    record.actual_end_date = Some(date(2026, 3, 30));
    let imported = controller.import(record, now()).unwrap();
    assert_eq!(imported.state, AssignmentState::Finalized);
    assert_eq!(imported.total_cost, dec!(7000.00));
    assert!(imported.maintenance_validated);
    assert_eq!(
        imported.created_at,
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    );

    let err = controller
        .import(import_record(AssignmentState::Active), now())
        .unwrap_err();
    assert!(matches!(err, AssignmentError::EquipmentAlreadyAssigned { .. }));
}

#[test]
fn import_checks_end_date_against_state() {
    let controller = controller();
    let err = controller
        .import(import_record(AssignmentState::Finalized), now())
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["actualEndDate".to_string()]);

    let mut record = import_record(AssignmentState::Suspended);
    record.actual_end_date = Some(date(2026, 3, 30));
    let err = controller.import(record, now()).unwrap_err();
    assert_eq!(validation_fields(err), vec!["actualEndDate".to_string()]);
}

#[test]
fn import_skips_status_check_for_closed_records() {
    let controller = controller();
    let mut record = import_record(AssignmentState::Cancelled);
    record.assignment.equipment_id = Some("E-OOS".into());
    let imported = controller.import(record, now()).unwrap();
    assert_eq!(imported.state, AssignmentState::Cancelled);

    let mut record = import_record(AssignmentState::Active);
    record.assignment.equipment_id = Some("E-OOS".into());
    let err = controller.import(record, now()).unwrap_err();
    assert_eq!(validation_fields(err), vec!["equipmentId".to_string()]);
}

#[test]
fn purge_only_removes_terminal_records() {
    let controller = controller();
    let created = create_p1(&controller);

    let err = controller.purge(created.id).unwrap_err();
    assert!(matches!(
        err,
        AssignmentError::InvalidState {
            state: AssignmentState::Active,
            ..
        }
    ));

    controller
        .transition(created.id, TransitionRequest::to(AssignmentState::Cancelled), now())
        .unwrap();
    controller.purge(created.id).unwrap();
    assert!(matches!(
        controller.get(created.id),
        Err(AssignmentError::NotFound(id)) if id == created.id
    ));
    assert!(matches!(
        controller.purge(created.id),
        Err(AssignmentError::NotFound(_))
    ));
}

#[test]
fn unknown_ids_are_not_found() {
    let controller = controller();
    let missing = Uuid::new_v4();
    assert!(matches!(
        controller.get(missing),
        Err(AssignmentError::NotFound(_))
    ));
    assert!(matches!(
        controller.update_terms(missing, TermsPatch::default(), now()),
        Err(AssignmentError::NotFound(_))
    ));
    assert!(matches!(
        controller.transition(missing, TransitionRequest::to(AssignmentState::Suspended), now()),
        Err(AssignmentError::NotFound(_))
    ));
}

type RaceFn = Box<dyn FnOnce(&mut Assignment) + Send>;

/// Ledger that lets another writer commit right after the next `get`, so
/// the caller holds a snapshot that is already out of date.
struct InterleavingLedger {
    inner: InMemoryLedger,
    race: Mutex<Option<RaceFn>>,
}

impl InterleavingLedger {
    fn new() -> Self {
        Self {
            inner: InMemoryLedger::new(),
            race: Mutex::new(None),
        }
    }

    fn after_next_read(&self, race: impl FnOnce(&mut Assignment) + Send + 'static) {
        *self.race.lock() = Some(Box::new(race));
    }
}

impl AssignmentLedger for InterleavingLedger {
    fn find_active_by_equipment(
        &self,
        equipment_id: &str,
    ) -> Result<Option<Assignment>, LedgerError> {
        self.inner.find_active_by_equipment(equipment_id)
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Assignment>, LedgerError> {
        self.inner.find_by_idempotency_key(key)
    }

    fn insert(&self, assignment: &Assignment) -> Result<Uuid, LedgerError> {
        self.inner.insert(assignment)
    }

    fn update(&self, expected: &Assignment, assignment: &Assignment) -> Result<(), LedgerError> {
        self.inner.update(expected, assignment)
    }

    fn get(&self, id: Uuid) -> Result<Option<Assignment>, LedgerError> {
        let snapshot = self.inner.get(id)?;
        if let (Some(read), Some(race)) = (snapshot.as_ref(), self.race.lock().take()) {
            let mut other = read.clone();
            race(&mut other);
            self.inner.update(read, &other)?;
        }
        Ok(snapshot)
    }

    fn list(&self, filter: &AssignmentFilter) -> Result<Vec<Assignment>, LedgerError> {
        self.inner.list(filter)
    }

    fn delete(&self, id: Uuid) -> Result<bool, LedgerError> {
        self.inner.delete(id)
    }
}

fn interleaving_controller() -> (AssignmentController, Arc<InterleavingLedger>) {
    let catalog = catalog();
    let ledger = Arc::new(InterleavingLedger::new());
    let controller = AssignmentController::new(ledger.clone(), catalog.clone(), catalog);
    (controller, ledger)
}

fn finalize_elsewhere(record: &mut Assignment) {
    record.state = AssignmentState::Finalized;
    record.actual_end_date = Some(date(2026, 3, 2));
}

#[test]
fn terms_update_does_not_revive_concurrently_finalized_record() {
    let (controller, ledger) = interleaving_controller();
    let created = create_p1(&controller);

    ledger.after_next_read(finalize_elsewhere);
    let err = controller
        .update_terms(
            created.id,
            TermsPatch {
                actual_hours: Some(dec!(120)),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        AssignmentError::ConcurrentModification {
            state: AssignmentState::Finalized,
            ..
        }
    ));

    let stored = controller.get(created.id).unwrap();
    assert_eq!(stored.state, AssignmentState::Finalized);
    assert_eq!(stored.actual_end_date, Some(date(2026, 3, 2)));
    assert_eq!(stored.actual_hours, Decimal::ZERO);
}

#[test]
fn transition_does_not_overwrite_concurrent_change() {
    let (controller, ledger) = interleaving_controller();
    let created = create_p1(&controller);

    ledger.after_next_read(finalize_elsewhere);
    let err = controller
        .transition(created.id, TransitionRequest::to(AssignmentState::Cancelled), now())
        .unwrap_err();
    assert!(matches!(err, AssignmentError::ConcurrentModification { .. }));
    assert_eq!(
        controller.get(created.id).unwrap().state,
        AssignmentState::Finalized
    );

    // A suspend that lands first is kept as well.
    let second = controller
        .create(request("E2", "P1", RetributionMode::Percentage, dec!(10)), now())
        .unwrap();
    ledger.after_next_read(|record| record.state = AssignmentState::Suspended);
    let err = controller
        .update_terms(
            second.id,
            TermsPatch {
                notes: Some("late edit".into()),
                ..TermsPatch::default()
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        AssignmentError::ConcurrentModification {
            state: AssignmentState::Suspended,
            ..
        }
    ));
    let stored = controller.get(second.id).unwrap();
    assert_eq!(stored.state, AssignmentState::Suspended);
    assert_eq!(stored.notes, None);
}

#[test]
fn in_memory_ledger_refuses_stale_snapshot() {
    let ledger = InMemoryLedger::new();
    assert!(ledger.is_empty());
    let catalog = catalog();
    let controller = AssignmentController::new(
        Arc::new(InMemoryLedger::new()),
        catalog.clone(),
        catalog,
    );
    let record = create_p1(&controller);
    ledger.insert(&record).unwrap();
    assert_eq!(ledger.len(), 1);

    let mut suspended = record.clone();
    suspended.state = AssignmentState::Suspended;
    ledger.update(&record, &suspended).unwrap();

    let mut stale = record.clone();
    stale.notes = Some("from an old read".into());
    assert_eq!(
        ledger.update(&record, &stale).unwrap_err(),
        LedgerError::Stale {
            id: record.id,
            state: AssignmentState::Suspended,
        }
    );
    assert_eq!(ledger.get(record.id).unwrap(), Some(suspended));
}
