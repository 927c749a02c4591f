use crudkit_core::model::ValidationError;
use crudkit_core::uow::UowError;
use crudkit_core::{
    sample_registry, CrudError, CrudService, Employee, PersistenceContext, Predicate, Product,
    QueryError, StoreConfig, Student, TransactionState, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn context() -> PersistenceContext {
    let registry = Arc::new(sample_registry(BTreeMap::new()).unwrap());
    PersistenceContext::open(StoreConfig::in_memory(), registry).unwrap()
}

fn five_employees() -> Vec<Employee> {
    vec![
        Employee::new(1, "John Doe", "New York", "Manager", 1_234_567_890),
        Employee::new(2, "Jane Smith", "Los Angeles", "Developer", 9_876_543_210),
        Employee::new(3, "Mike Johnson", "Chicago", "Analyst", 5_555_555_555),
        Employee::new(4, "Emily Davis", "Houston", "Designer", 4_444_444_444),
        Employee::new(5, "Robert Brown", "Phoenix", "Tester", 3_333_333_333),
    ]
}

#[test]
fn five_employee_scenario() {
    let context = context();
    let service = CrudService::new(&context);

    assert_eq!(service.insert_many(&five_employees()).unwrap(), 5);
    assert_eq!(service.count::<Employee>().unwrap(), 5);

    let jane = service.find_by_id::<Employee>(2).unwrap().unwrap();
    assert_eq!(jane.name, "Jane Smith");

    let updated = service
        .update_field::<Employee>(3, "post", "HR".to_string())
        .unwrap();
    assert_eq!(updated, 1);
    let mike = service.find_by_id::<Employee>(3).unwrap().unwrap();
    assert_eq!(mike.post, "HR");

    assert_eq!(
        service.delete_where::<Employee>(&Predicate::eq("id", 3)).unwrap(),
        1
    );
    assert_eq!(service.count::<Employee>().unwrap(), 4);
    assert!(service.find_by_id::<Employee>(3).unwrap().is_none());
}

#[test]
fn inserted_records_round_trip_by_primary_key() {
    let context = context();
    let service = CrudService::new(&context);
    let students = vec![
        Student::new(1, "Ravi", "Java", "Delhi", 9_811_111_111),
        Student::new(2, "Meera", "Python", "Mumbai", 9_822_222_222),
    ];
    let products = vec![Product::new(10, "Pen", "2024-01-15", 20)];

    service.insert_many(&students).unwrap();
    service.insert_many(&products).unwrap();

    for student in &students {
        assert_eq!(
            service.find_by_id::<Student>(student.id).unwrap().as_ref(),
            Some(student)
        );
    }
    assert_eq!(
        service.find_by_id::<Product>(10).unwrap(),
        Some(products[0].clone())
    );
}

#[test]
fn commit_makes_rows_visible_and_rollback_leaves_count_unchanged() {
    let context = context();
    let service = CrudService::new(&context);

    let mut unit = context.unit_of_work();
    unit.begin().unwrap();
    service
        .stage_insert_many(&mut unit, &five_employees()[..3])
        .unwrap();
    assert_eq!(service.count::<Employee>().unwrap(), 0);
    let summary = unit.commit().unwrap();
    assert_eq!(summary.total(), 3);
    assert_eq!(service.count::<Employee>().unwrap(), 3);

    let mut unit = context.unit_of_work();
    unit.begin().unwrap();
    service
        .stage_insert_many(&mut unit, &five_employees()[3..])
        .unwrap();
    unit.rollback().unwrap();
    assert_eq!(unit.state(), TransactionState::RolledBack);
    assert_eq!(service.count::<Employee>().unwrap(), 3);
}

#[test]
fn missing_keys_and_empty_matches_affect_zero_rows() {
    let context = context();
    let service = CrudService::new(&context);
    service.insert_many(&five_employees()).unwrap();

    let updated = service
        .update_field::<Employee>(99, "city", "Austin".to_string())
        .unwrap();
    assert_eq!(updated, 0);
    assert_eq!(
        service
            .delete_where::<Employee>(&Predicate::eq("city", "Atlantis".to_string()))
            .unwrap(),
        0
    );
    assert_eq!(service.remove_by_id::<Employee>(42).unwrap(), 0);
    assert_eq!(service.count::<Employee>().unwrap(), 5);
}

#[test]
fn second_and_later_commits_are_illegal() {
    let context = context();
    let mut unit = context.unit_of_work();
    unit.begin().unwrap();
    unit.persist(&five_employees()[0]).unwrap();
    unit.commit().unwrap();

    for _ in 0..2 {
        match unit.commit() {
            Err(UowError::IllegalState { operation, state }) => {
                assert_eq!(operation, "commit");
                assert_eq!(state, TransactionState::Committed);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[test]
fn update_field_guards_primary_key_and_column_constraints() {
    let context = context();
    let service = CrudService::new(&context);
    service.insert_many(&five_employees()).unwrap();

    assert!(matches!(
        service.update_field::<Employee>(1, "id", 7),
        Err(CrudError::PrimaryKeyUpdate { .. })
    ));
    assert!(matches!(
        service.update_field::<Employee>(1, "name", "Far too long a name".to_string()),
        Err(CrudError::Validation(ValidationError::TooLong { max: 15, .. }))
    ));
    assert!(matches!(
        service.update_field::<Employee>(1, "salary", 10),
        Err(CrudError::Query(QueryError::UnknownField { .. }))
    ));
    assert!(matches!(
        service.update_field::<Employee>(1, "mobile_no", "not-a-number".to_string()),
        Err(CrudError::Validation(ValidationError::TypeMismatch {
            expected: "INTEGER",
            found: "text",
            ..
        }))
    ));

    let john = service.find_by_id::<Employee>(1).unwrap().unwrap();
    assert_eq!(john.name, "John Doe");
    assert_eq!(john.mobile_no, 1_234_567_890);
}

#[test]
fn failed_batch_is_all_or_nothing() {
    let context = context();
    let service = CrudService::new(&context);
    service.insert_many(&five_employees()[..1]).unwrap();

    let mut batch = five_employees();
    batch[3].name = "John Doe".to_string();
    let err = service.insert_many(&batch[1..]).unwrap_err();
    assert!(matches!(
        err,
        CrudError::Uow(UowError::Persistence { .. })
    ));
    assert_eq!(service.count::<Employee>().unwrap(), 1);
}

#[test]
fn merge_is_last_write_wins() {
    let context = context();
    let service = CrudService::new(&context);

    assert_eq!(service.merge(&Product::new(1, "Pencil", "2024-02-01", 5)).unwrap(), 1);
    assert_eq!(service.merge(&Product::new(1, "Pencil", "2024-03-01", 7)).unwrap(), 1);

    let stored = service.find_by_id::<Product>(1).unwrap().unwrap();
    assert_eq!(stored.manufacturing_date, "2024-03-01");
    assert_eq!(stored.price, 7);
    assert_eq!(service.count::<Product>().unwrap(), 1);
}

#[test]
fn find_where_and_project_filter_by_fields() {
    let context = context();
    let service = CrudService::new(&context);
    service.insert_many(&five_employees()).unwrap();

    let senior = service
        .find_where::<Employee>(
            &Predicate::ge("id", 4).or(Predicate::eq("post", "Manager".to_string())),
        )
        .unwrap();
    let mut ids = senior.iter().map(|employee| employee.id).collect::<Vec<_>>();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 4, 5]);

    let rows = service
        .project::<Employee>(
            &["name", "mobile_no"],
            &Predicate::eq("city", "Chicago".to_string()),
        )
        .unwrap();
    assert_eq!(rows.columns, vec!["name", "mobile_no"]);
    assert_eq!(
        rows.rows,
        vec![vec![
            Value::Text("Mike Johnson".to_string()),
            Value::Integer(5_555_555_555)
        ]]
    );
}
