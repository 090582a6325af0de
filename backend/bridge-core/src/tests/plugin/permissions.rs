use crate::error::PluginError;
use crate::plugin::PermissionPolicy;

use std::collections::BTreeMap;

fn declared(permissions: &[&str]) -> Vec<String> {
    permissions.iter().map(|p| p.to_string()).collect()
}

/// **VALUE**: The default policy grants what a plugin declares.
#[test]
fn given_declared_policy_when_resolving_then_declared_permissions_are_granted() {
    let granted = PermissionPolicy::Declared
        .resolve("notes", &declared(&["fs:read", "fs:write"]), &BTreeMap::new())
        .expect("declared policy never refuses");

    assert_eq!(granted.len(), 2);
    assert!(granted.contains("fs:write"));
}

/// **VALUE**: The explicit policy refuses a declared permission missing from the grants.
///
/// **BUG THIS CATCHES**: Would catch the explicit policy silently granting
/// declared permissions, which would make the grants table meaningless.
#[test]
fn given_explicit_policy_when_declared_permission_not_granted_then_init_error() {
    let mut grants = BTreeMap::new();
    grants.insert(String::from("notes"), vec![String::from("fs:read")]);

    let error = PermissionPolicy::Explicit
        .resolve("notes", &declared(&["fs:read", "fs:write"]), &grants)
        .expect_err("fs:write not granted");

    match error {
        PluginError::Init { plugin, message, .. } => {
            assert_eq!(plugin, "notes");
            assert_eq!(message, "required permission 'fs:write' was not granted");
        }
        other => panic!("Expected Init error, got {other:?}"),
    }
}

/// **VALUE**: Under the explicit policy the grants, not the declarations, are the permission set.
#[test]
fn given_explicit_policy_with_extra_grants_when_resolving_then_grants_are_used() {
    let mut grants = BTreeMap::new();
    grants.insert(
        String::from("notes"),
        vec![String::from("fs:read"), String::from("clipboard")],
    );

    let granted = PermissionPolicy::Explicit
        .resolve("notes", &declared(&["fs:read"]), &grants)
        .expect("everything declared is granted");

    assert_eq!(granted.iter().collect::<Vec<_>>(), vec!["clipboard", "fs:read"]);
}
