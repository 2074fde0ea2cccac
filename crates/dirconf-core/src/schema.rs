//! Declarative schema tables
//!
//! One `ResourceSchema` per resource type drives normalization, diffing and
//! the reconciler. Polymorphic families (one endpoint, several subtypes)
//! declare their subtypes as variants selected by the `type` discriminator.

use crate::error::{Error, Result};
use crate::value::{AttributeMap, AttributeValue};

/// Name of the discriminator field of polymorphic resources
pub const DISCRIMINATOR: &str = "type";

/// Value kind of a field, fixed for the field's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean
    Bool,
    /// 64-bit integer
    Int64,
    /// Free-form string
    String,
    /// String from a closed vocabulary
    Enum(Vec<&'static str>),
    /// Ordered list of strings
    StringList,
    /// Unordered set of strings
    StringSet,
    /// Unordered set of strings from a closed vocabulary
    EnumSet(Vec<&'static str>),
}

impl FieldKind {
    /// Human-readable kind name
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int64 => "int64",
            FieldKind::String => "string",
            FieldKind::Enum(_) => "enum",
            FieldKind::StringList => "list",
            FieldKind::StringSet => "set",
            FieldKind::EnumSet(_) => "enum set",
        }
    }

    /// Closed vocabulary, if the kind has one
    pub fn vocabulary(&self) -> Option<&[&'static str]> {
        match self {
            FieldKind::Enum(v) | FieldKind::EnumSet(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, FieldKind::StringSet | FieldKind::EnumSet(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::StringList)
    }

    pub fn is_collection(&self) -> bool {
        self.is_set() || self.is_list()
    }

    /// The value an unset field of this kind holds
    pub fn empty_value(&self) -> AttributeValue {
        match self {
            FieldKind::StringList => AttributeValue::StringList(Vec::new()),
            FieldKind::StringSet | FieldKind::EnumSet(_) => {
                AttributeValue::StringSet(Default::default())
            }
            _ => AttributeValue::Null,
        }
    }
}

/// Declaration of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Field name as it appears on the wire
    pub name: &'static str,
    /// Value kind
    pub kind: FieldKind,
    /// The plan must provide a value
    pub required: bool,
    /// The server assigns a value when the plan is silent
    pub computed: bool,
    /// Server-assigned only; a plan can never set it
    pub read_only: bool,
    /// An empty string means the same as no value
    pub empty_is_null: bool,
    /// The server never echoes the real value
    pub sensitive: bool,
    /// Cannot change after creation
    pub immutable: bool,
}

impl FieldSchema {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            computed: false,
            read_only: false,
            empty_is_null: false,
            sensitive: false,
            immutable: false,
        }
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn int64(name: &'static str) -> Self {
        Self::new(name, FieldKind::Int64)
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn enumeration(name: &'static str, vocabulary: &[&'static str]) -> Self {
        Self::new(name, FieldKind::Enum(vocabulary.to_vec()))
    }

    pub fn list(name: &'static str) -> Self {
        Self::new(name, FieldKind::StringList)
    }

    pub fn set(name: &'static str) -> Self {
        Self::new(name, FieldKind::StringSet)
    }

    pub fn enum_set(name: &'static str, vocabulary: &[&'static str]) -> Self {
        Self::new(name, FieldKind::EnumSet(vocabulary.to_vec()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self.computed = true;
        self
    }

    pub fn empty_is_null(mut self) -> Self {
        self.empty_is_null = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Check that `value` fits this field
    ///
    /// `Null` and `Unknown` always fit; required-ness is checked by the
    /// normalization layer, which knows whether it is building a plan.
    pub fn check(&self, resource: &str, value: &AttributeValue) -> Result<()> {
        let fits = match (&self.kind, value) {
            (_, AttributeValue::Null | AttributeValue::Unknown) => true,
            (FieldKind::Bool, AttributeValue::Bool(_)) => true,
            (FieldKind::Int64, AttributeValue::Int64(_)) => true,
            (FieldKind::String, AttributeValue::String(_)) => true,
            (FieldKind::Enum(_), AttributeValue::Enum(_)) => true,
            (FieldKind::StringList, AttributeValue::StringList(_)) => true,
            (FieldKind::StringSet | FieldKind::EnumSet(_), AttributeValue::StringSet(_)) => true,
            _ => false,
        };
        if !fits {
            return Err(Error::schema_violation(
                resource,
                self.name,
                format!("expected {}, got {}", self.kind.name(), value.kind_name()),
            ));
        }

        if let Some(vocabulary) = self.kind.vocabulary() {
            let members: Vec<&str> = match value {
                AttributeValue::Enum(s) => vec![s.as_str()],
                AttributeValue::StringSet(items) => items.iter().map(String::as_str).collect(),
                _ => Vec::new(),
            };
            for member in members {
                if !vocabulary.contains(&member) {
                    return Err(Error::schema_violation(
                        resource,
                        self.name,
                        format!("'{}' is not one of [{}]", member, vocabulary.join(", ")),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Lifecycle class of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceClass {
    /// Exactly one instance exists server-wide
    pub is_singleton: bool,
    /// Instances can be created and destroyed
    pub is_deletable: bool,
}

impl ResourceClass {
    /// Ordinary objects: created, updated and deleted
    pub const DELETABLE: Self = Self {
        is_singleton: false,
        is_deletable: true,
    };

    /// Server-wide singletons, e.g. the global configuration
    pub const SINGLETON: Self = Self {
        is_singleton: true,
        is_deletable: false,
    };

    /// Keyed objects that ship with the server and cannot be removed
    pub const DEFAULT_OBJECT: Self = Self {
        is_singleton: false,
        is_deletable: false,
    };

    /// Whether "create" means adopting the existing object
    pub fn adopt_only(&self) -> bool {
        self.is_singleton || !self.is_deletable
    }
}

/// Fields specific to one subtype of a polymorphic family
#[derive(Debug, Clone)]
pub struct VariantSchema {
    name: &'static str,
    fields: Vec<FieldSchema>,
}

impl VariantSchema {
    pub fn new(name: &'static str, fields: Vec<FieldSchema>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
}

/// Schema table of one resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    name: &'static str,
    endpoint: &'static str,
    class: ResourceClass,
    key_arity: usize,
    discriminator: Option<FieldSchema>,
    fields: Vec<FieldSchema>,
    variants: Vec<VariantSchema>,
}

impl ResourceSchema {
    /// Create a schema
    ///
    /// `endpoint` is a path template relative to the configuration API root,
    /// with `{0}`, `{1}`, ... standing for the key segments.
    pub fn new(
        name: &'static str,
        endpoint: &'static str,
        class: ResourceClass,
        key_arity: usize,
    ) -> Self {
        Self {
            name,
            endpoint,
            class,
            key_arity,
            discriminator: None,
            fields: Vec::new(),
            variants: Vec::new(),
        }
    }

    /// Add fields shared by every variant
    pub fn with_fields(mut self, fields: Vec<FieldSchema>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a subtype, turning the schema into a polymorphic family
    pub fn with_variant(mut self, variant: VariantSchema) -> Self {
        self.variants.push(variant);
        let names: Vec<&'static str> = self.variants.iter().map(|v| v.name).collect();
        self.discriminator = Some(
            FieldSchema::enumeration(DISCRIMINATOR, &names)
                .required()
                .immutable(),
        );
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }

    pub fn key_arity(&self) -> usize {
        self.key_arity
    }

    pub fn is_polymorphic(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn variants(&self) -> &[VariantSchema] {
        &self.variants
    }

    pub fn variant(&self, name: &str) -> Option<&VariantSchema> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Look a field up in the base schema or any variant
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.discriminator
            .iter()
            .chain(self.fields.iter())
            .chain(self.variants.iter().flat_map(|v| v.fields.iter()))
            .find(|f| f.name == name)
    }

    /// Fields of the given variant, in declaration order
    ///
    /// Order: discriminator, base fields, then the variant's own fields.
    pub fn active_fields(&self, variant: Option<&str>) -> Result<Vec<&FieldSchema>> {
        let Some(discriminator) = &self.discriminator else {
            if let Some(variant) = variant {
                return Err(Error::schema_violation(
                    self.name,
                    DISCRIMINATOR,
                    format!("'{}' given but resource type has no variants", variant),
                ));
            }
            return Ok(self.fields.iter().collect());
        };

        let Some(variant) = variant else {
            return Err(Error::schema_violation(
                self.name,
                DISCRIMINATOR,
                "polymorphic resource requires a type",
            ));
        };
        let variant = self.variant(variant).ok_or_else(|| {
            Error::schema_violation(
                self.name,
                DISCRIMINATOR,
                format!("unknown type '{}'", variant),
            )
        })?;

        Ok(std::iter::once(discriminator)
            .chain(self.fields.iter())
            .chain(variant.fields.iter())
            .collect())
    }

    /// Variant named by a map's discriminator
    pub fn variant_of<'m>(&self, map: &'m AttributeMap) -> Result<Option<&'m str>> {
        match map.get(DISCRIMINATOR) {
            None | Some(AttributeValue::Null) | Some(AttributeValue::Unknown) => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or_else(|| {
                Error::schema_violation(
                    self.name,
                    DISCRIMINATOR,
                    format!("expected a type name, got {}", value.kind_name()),
                )
            }),
        }
    }

    /// Active fields for a map, selected by its discriminator
    pub fn fields_for(&self, map: &AttributeMap) -> Result<Vec<&FieldSchema>> {
        self.active_fields(self.variant_of(map)?)
    }

    /// Reject fields outside the active variant and values of the wrong kind
    pub fn validate_map(&self, map: &AttributeMap) -> Result<()> {
        let active = self.fields_for(map)?;
        for (name, value) in map.iter() {
            match active.iter().find(|f| f.name == name) {
                Some(field) => field.check(self.name, value)?,
                None => return Err(self.undeclared(name, map)),
            }
        }
        Ok(())
    }

    /// Error for a field that is not valid in the map's variant
    pub(crate) fn undeclared(&self, name: &str, map: &AttributeMap) -> Error {
        let owner = self
            .variants
            .iter()
            .find(|v| v.fields.iter().any(|f| f.name == name));
        let message = match (owner, self.variant_of(map).ok().flatten()) {
            (Some(owner), Some(active)) => format!(
                "field belongs to type '{}', not valid for type '{}'",
                owner.name, active
            ),
            _ => "field is not declared".to_string(),
        };
        Error::schema_violation(self.name, name, message)
    }
}
