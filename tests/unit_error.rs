use tw::error::{exit_codes, Error, JsonError};
use tw::model::Status;

#[test]
fn exit_codes_map_correctly() {
    let user = Error::InvalidArgument("bad".to_string());
    assert_eq!(user.exit_code(), exit_codes::USER_ERROR);

    let not_open = Error::NotOpen {
        id: "AB-01".to_string(),
        status: Status::Done,
    };
    assert_eq!(not_open.exit_code(), exit_codes::USER_ERROR);

    let policy = Error::IncompleteBlockers {
        id: "AB-01".to_string(),
        blockers: vec!["AB-02W".to_string()],
    };
    assert_eq!(policy.exit_code(), exit_codes::DEPENDENCY_BLOCKED);

    let cycle = Error::Cycle {
        path: vec!["AB-01".to_string(), "AB-01".to_string()],
    };
    assert_eq!(cycle.exit_code(), exit_codes::DEPENDENCY_BLOCKED);

    let op = Error::OperationFailed("boom".to_string());
    assert_eq!(op.exit_code(), exit_codes::OPERATION_FAILED);

    let validation = Error::ValidationFailed {
        count: 1,
        issues: vec!["AB-01 [cycle] AB-01 -> AB-01".to_string()],
    };
    assert_eq!(validation.exit_code(), exit_codes::OPERATION_FAILED);
}

#[test]
fn json_error_includes_code() {
    let err = Error::ProjectNotFound("ZZ".to_string());
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    assert!(json.error.contains("Project not found"));
    assert!(json.details.is_none());
}

#[test]
fn json_error_carries_details() {
    let err = Error::Cycle {
        path: ["AB-001", "AB-102", "AB-001"].map(String::from).to_vec(),
    };
    assert_eq!(err.to_string(), "Dependency cycle: AB-001 -> AB-102 -> AB-001");

    let json = JsonError::from(&err);
    let details = json.details.expect("details");
    assert_eq!(details["path"][1], "AB-102");
}
