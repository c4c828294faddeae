//! Sample objects for exercising queries and relations.
//!
//! The objects mirror a small CRM: accounts with contacts and opportunities,
//! contacts enrolled in campaigns through the `CampaignMember` junction, and
//! cases logged against contacts. Between them they declare every relation
//! kind:
//!
//! | object      | relation        | kind             |
//! |-------------|-----------------|------------------|
//! | Account     | Contacts        | has many         |
//! | Account     | Opportunities   | has many         |
//! | Account     | PrimaryContact  | has one          |
//! | Account     | Owner           | belongs to       |
//! | Contact     | Account         | belongs to       |
//! | Contact     | Campaigns       | belongs to many  |
//! | Contact     | Cases           | has many         |
//! | Opportunity | Account         | belongs to       |
//! | Campaign    | Contacts        | belongs to many  |
//! | Case        | Contact         | belongs to       |

use std::sync::{Arc, LazyLock};

use forceorm_core::{ForceResult, Settings};
use forceorm_db::model::{Model, ObjectMeta, Record, RelationDef};
use forceorm_db::schema::{FieldType, ObjectSchema, SchemaCache};
use forceorm_db::value::FromValue;
use forceorm_db::Connection;

use crate::mock_transport::MockTransport;
use crate::static_schema::StaticSchema;

// ── Metadata ─────────────────────────────────────────────────────────────

/// `Account`: contacts, opportunities, a primary contact, and an owner.
pub fn account_meta() -> &'static ObjectMeta {
    static META: LazyLock<ObjectMeta> = LazyLock::new(|| {
        ObjectMeta::new("Account", "Id")
            .with_relation(RelationDef::has_many("Contacts", contact_meta, "AccountId", "Id"))
            .with_relation(RelationDef::has_many(
                "Opportunities",
                opportunity_meta,
                "AccountId",
                "Id",
            ))
            .with_relation(RelationDef::has_one("PrimaryContact", contact_meta, "AccountId", "Id"))
            .with_relation(RelationDef::belongs_to("Owner", user_meta, "OwnerId", "Id"))
    });
    &META
}

/// `Contact`: its account, campaigns through `CampaignMember`, and cases.
pub fn contact_meta() -> &'static ObjectMeta {
    static META: LazyLock<ObjectMeta> = LazyLock::new(|| {
        ObjectMeta::new("Contact", "Id")
            .with_relation(RelationDef::belongs_to("Account", account_meta, "AccountId", "Id"))
            .with_relation(RelationDef::belongs_to_many(
                "Campaigns",
                campaign_meta,
                "CampaignMember",
                "ContactId",
                "CampaignId",
                "Id",
                "Id",
            ))
            .with_relation(RelationDef::has_many("Cases", case_meta, "ContactId", "Id"))
    });
    &META
}

pub fn opportunity_meta() -> &'static ObjectMeta {
    static META: LazyLock<ObjectMeta> = LazyLock::new(|| {
        ObjectMeta::new("Opportunity", "Id")
            .with_relation(RelationDef::belongs_to("Account", account_meta, "AccountId", "Id"))
    });
    &META
}

pub fn campaign_meta() -> &'static ObjectMeta {
    static META: LazyLock<ObjectMeta> = LazyLock::new(|| {
        ObjectMeta::new("Campaign", "Id").with_relation(RelationDef::belongs_to_many(
            "Contacts",
            contact_meta,
            "CampaignMember",
            "CampaignId",
            "ContactId",
            "Id",
            "Id",
        ))
    });
    &META
}

pub fn case_meta() -> &'static ObjectMeta {
    static META: LazyLock<ObjectMeta> = LazyLock::new(|| {
        ObjectMeta::new("Case", "Id")
            .with_relation(RelationDef::belongs_to("Contact", contact_meta, "ContactId", "Id"))
    });
    &META
}

pub fn user_meta() -> &'static ObjectMeta {
    static META: LazyLock<ObjectMeta> = LazyLock::new(|| ObjectMeta::new("User", "Id"));
    &META
}

// ── Schema ───────────────────────────────────────────────────────────────

/// Field descriptions of every sample object, `CampaignMember` included.
pub fn schema() -> StaticSchema {
    use FieldType::{Boolean, Date, DateTime, Other, String};

    StaticSchema::new()
        .with_object(ObjectSchema::new(
            "Account",
            [
                ("Id", String),
                ("Name", String),
                ("OwnerId", String),
                ("Industry", String),
                ("AnnualRevenue", Other),
                ("IsDeleted", Boolean),
                ("CreatedDate", DateTime),
            ],
        ))
        .with_object(ObjectSchema::new(
            "Contact",
            [
                ("Id", String),
                ("AccountId", String),
                ("FirstName", String),
                ("LastName", String),
                ("Email", String),
                ("Birthdate", Date),
                ("HasOptedOutOfEmail", Boolean),
            ],
        ))
        .with_object(ObjectSchema::new(
            "Opportunity",
            [
                ("Id", String),
                ("AccountId", String),
                ("Name", String),
                ("StageName", String),
                ("Amount", Other),
                ("CloseDate", Date),
                ("IsWon", Boolean),
            ],
        ))
        .with_object(ObjectSchema::new(
            "Campaign",
            [("Id", String), ("Name", String), ("IsActive", Boolean)],
        ))
        .with_object(ObjectSchema::new(
            "CampaignMember",
            [("Id", String), ("ContactId", String), ("CampaignId", String)],
        ))
        .with_object(ObjectSchema::new(
            "Case",
            [
                ("Id", String),
                ("ContactId", String),
                ("Subject", String),
                ("Status", String),
                ("IsClosed", Boolean),
            ],
        ))
        .with_object(ObjectSchema::new(
            "User",
            [("Id", String), ("Name", String), ("IsActive", Boolean)],
        ))
}

/// A connection to `transport` describing the sample objects.
pub fn connection(transport: Arc<MockTransport>) -> Connection {
    connection_with(transport, Settings::default())
}

/// As [`connection`], with explicit settings.
pub fn connection_with(transport: Arc<MockTransport>, settings: Settings) -> Connection {
    Connection::new(transport, Arc::new(SchemaCache::new(schema())), settings)
}

// ── Typed models ─────────────────────────────────────────────────────────

fn optional<T: FromValue>(record: &Record, field: &str) -> ForceResult<Option<T>> {
    Option::<T>::from_value(record.value(field))
}

fn related_many<M: Model>(record: &mut Record, relation: &str) -> ForceResult<Vec<M>> {
    record
        .take_relation(relation)
        .map(|value| value.into_records().into_iter().map(M::from_record).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

/// A typed `Account` carrying whichever to-many relations were loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub name: Option<String>,
    pub owner_id: Option<String>,
    pub contacts: Vec<Contact>,
    pub opportunities: Vec<Opportunity>,
}

impl Model for Account {
    fn meta() -> &'static ObjectMeta {
        account_meta()
    }

    fn from_record(mut record: Record) -> ForceResult<Self> {
        Ok(Self {
            id: record.get_as("Id")?,
            name: optional(&record, "Name")?,
            owner_id: optional(&record, "OwnerId")?,
            contacts: related_many(&mut record, "Contacts")?,
            opportunities: related_many(&mut record, "Opportunities")?,
        })
    }
}

/// A typed `Contact`.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    pub account_id: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl Model for Contact {
    fn meta() -> &'static ObjectMeta {
        contact_meta()
    }

    fn from_record(record: Record) -> ForceResult<Self> {
        Ok(Self {
            id: record.get_as("Id")?,
            account_id: optional(&record, "AccountId")?,
            last_name: optional(&record, "LastName")?,
            email: optional(&record, "Email")?,
        })
    }
}

/// A typed `Opportunity`.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub id: String,
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub is_won: Option<bool>,
}

impl Model for Opportunity {
    fn meta() -> &'static ObjectMeta {
        opportunity_meta()
    }

    fn from_record(record: Record) -> ForceResult<Self> {
        Ok(Self {
            id: record.get_as("Id")?,
            account_id: optional(&record, "AccountId")?,
            name: optional(&record, "Name")?,
            amount: optional(&record, "Amount")?,
            is_won: optional(&record, "IsWon")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forceorm_db::model::RelationKind;

    #[test]
    fn test_relations_resolve() {
        let def = contact_meta().relation("Campaigns").unwrap();
        assert_eq!(def.related_meta().object_name, "Campaign");
        assert!(matches!(def.kind, RelationKind::BelongsToMany { .. }));
        assert!(account_meta().relation("PrimaryContact").unwrap().kind.is_to_one());
    }

    #[test]
    fn test_account_from_record() {
        let record = Record::with_attributes("Account", [("Id", "001A"), ("Name", "Acme")]);
        let account = Account::from_record(record).unwrap();
        assert_eq!(account.id, "001A");
        assert_eq!(account.name.as_deref(), Some("Acme"));
        assert_eq!(account.owner_id, None);
        assert!(account.contacts.is_empty());
    }
}
