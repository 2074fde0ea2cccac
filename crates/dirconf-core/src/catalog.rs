//! Built-in resource catalog
//!
//! Schema tables for a representative slice of the configuration API. Each
//! table is pure data; registering another resource type takes one more
//! function here (or a `register_schema` call from the embedding crate).

use crate::schema::{FieldSchema, ResourceClass, ResourceSchema, VariantSchema};

const PRIVILEGES: &[&str] = &[
    "audit-data-security",
    "backend-backup",
    "backend-restore",
    "bypass-acl",
    "bypass-pw-policy",
    "config-read",
    "config-write",
    "disconnect-client",
    "jmx-read",
    "ldif-export",
    "ldif-import",
    "lockdown-mode",
    "modify-acl",
    "password-reset",
    "privilege-change",
    "proxied-auth",
    "server-restart",
    "server-shutdown",
    "soft-delete-read",
    "unindexed-search",
    "update-schema",
];

const ALERT_SEVERITIES: &[&str] = &["error", "fatal", "info", "warning"];

/// Every built-in schema
pub fn builtin() -> Vec<ResourceSchema> {
    vec![
        global_configuration(),
        root_dn(),
        alert_handler(),
        local_db_index(),
        root_dn_user(),
        default_password_policy(),
    ]
}

/// Server-wide settings; always exists
pub fn global_configuration() -> ResourceSchema {
    ResourceSchema::new(
        "global-configuration",
        "global-configuration",
        ResourceClass::SINGLETON,
        0,
    )
    .with_fields(vec![
        FieldSchema::string("location").empty_is_null(),
        FieldSchema::string("instanceName").computed(),
        FieldSchema::enumeration("writabilityMode", &["enabled", "disabled", "internal-only"])
            .computed(),
        FieldSchema::bool("checkSchema").computed(),
        FieldSchema::bool("rejectUnauthenticatedRequests").computed(),
        FieldSchema::int64("lookthroughLimit").computed(),
        FieldSchema::int64("sizeLimit").computed(),
        FieldSchema::set("sensitiveAttribute"),
        FieldSchema::enum_set("disabledPrivilege", PRIVILEGES),
        FieldSchema::string("serverVersion").read_only(),
    ])
}

/// Defaults for every root user
pub fn root_dn() -> ResourceSchema {
    ResourceSchema::new("root-dn", "root-dn", ResourceClass::SINGLETON, 0).with_fields(vec![
        FieldSchema::enum_set("defaultRootPrivilegeName", PRIVILEGES).computed(),
    ])
}

/// Alert handlers, one family with a subtype per delivery mechanism
pub fn alert_handler() -> ResourceSchema {
    ResourceSchema::new(
        "alert-handler",
        "alert-handlers/{0}",
        ResourceClass::DELETABLE,
        1,
    )
    .with_fields(vec![
        FieldSchema::string("description").empty_is_null(),
        FieldSchema::bool("enabled").required(),
        FieldSchema::bool("asynchronous").computed(),
        FieldSchema::enum_set("enabledAlertSeverity", ALERT_SEVERITIES).computed(),
        FieldSchema::set("enabledAlertType"),
        FieldSchema::set("disabledAlertType"),
    ])
    .with_variant(VariantSchema::new(
        "smtp",
        vec![
            FieldSchema::string("senderAddress").required(),
            FieldSchema::set("recipientAddress"),
            FieldSchema::string("messageSubject").required(),
            FieldSchema::string("messageBody").required(),
        ],
    ))
    .with_variant(VariantSchema::new(
        "groovy-scripted",
        vec![
            FieldSchema::string("scriptClass").required(),
            FieldSchema::list("scriptArgument"),
        ],
    ))
}

/// Attribute indexes of a local DB backend, keyed `backend/index`
pub fn local_db_index() -> ResourceSchema {
    ResourceSchema::new(
        "local-db-index",
        "backends/{0}/local-db-indexes/{1}",
        ResourceClass::DELETABLE,
        2,
    )
    .with_fields(vec![
        FieldSchema::string("description").empty_is_null(),
        FieldSchema::string("attribute").required().immutable(),
        FieldSchema::enum_set(
            "indexType",
            &["approximate", "equality", "ordering", "presence", "substring"],
        ),
        FieldSchema::int64("indexEntryLimit").computed(),
        FieldSchema::bool("primeIndex").computed(),
    ])
}

/// Additional root users
pub fn root_dn_user() -> ResourceSchema {
    ResourceSchema::new(
        "root-dn-user",
        "root-dn/root-dn-users/{0}",
        ResourceClass::DELETABLE,
        1,
    )
    .with_fields(vec![
        FieldSchema::string("description").empty_is_null(),
        FieldSchema::set("alternateBindDN"),
        FieldSchema::string("password").sensitive(),
        FieldSchema::string("firstName").empty_is_null(),
        FieldSchema::string("lastName").empty_is_null(),
        FieldSchema::bool("inheritDefaultRootPrivileges").computed(),
        FieldSchema::enum_set("privilege", PRIVILEGES),
    ])
}

/// Password policies that ship with the server; adopted, never created
pub fn default_password_policy() -> ResourceSchema {
    ResourceSchema::new(
        "default-password-policy",
        "password-policies/{0}",
        ResourceClass::DEFAULT_OBJECT,
        1,
    )
    .with_fields(vec![
        FieldSchema::string("description").empty_is_null(),
        FieldSchema::string("passwordAttribute").computed(),
        FieldSchema::set("defaultPasswordStorageScheme").computed(),
        FieldSchema::bool("forceChangeOnReset").computed(),
        FieldSchema::int64("lockoutFailureCount").computed(),
        FieldSchema::string("maxPasswordAge").empty_is_null(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_have_no_key() {
        for schema in builtin() {
            if schema.class().is_singleton {
                assert_eq!(schema.key_arity(), 0, "{}", schema.name());
            }
        }
    }

    #[test]
    fn endpoint_placeholders_match_key_arity() {
        for schema in builtin() {
            for i in 0..schema.key_arity() {
                let placeholder = format!("{{{}}}", i);
                assert!(
                    schema.endpoint().contains(&placeholder),
                    "{} is missing {}",
                    schema.name(),
                    placeholder
                );
            }
            let extra = format!("{{{}}}", schema.key_arity());
            assert!(!schema.endpoint().contains(&extra), "{}", schema.name());
        }
    }

    #[test]
    fn alert_handler_is_polymorphic() {
        let schema = alert_handler();
        assert!(schema.is_polymorphic());
        assert!(schema.variant("smtp").is_some());
        assert!(schema.variant("groovy-scripted").is_some());
        assert!(schema.field("type").is_some_and(|f| f.immutable));
    }
}
