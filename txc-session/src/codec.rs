//! Record ↔ field-map codec.
//!
//! Records travel as flat string-to-string field maps (the backing store's hash payload). The
//! codec is explicit per record type: numeric fields are base-10 text, enums their integer
//! code, and the optional `applicationData` field is omitted entirely when absent — it is
//! never written as an empty value. Decoding is forward compatible: unknown fields are
//! ignored and missing fields take their type's zero value.

use txc_common::ids::{EpochMillis, StatusCode};
use txc_kv::containers::HotMap;

use crate::model::{BranchRecord, BranchType, GlobalRecord, GlobalStatus};

pub(crate) const FIELD_XID: &str = "xid";
pub(crate) const FIELD_TRANSACTION_ID: &str = "transactionId";
pub(crate) const FIELD_STATUS: &str = "status";
pub(crate) const FIELD_APPLICATION_ID: &str = "applicationId";
pub(crate) const FIELD_SERVICE_GROUP: &str = "serviceGroup";
pub(crate) const FIELD_TX_NAME: &str = "txName";
pub(crate) const FIELD_TIMEOUT: &str = "timeout";
pub(crate) const FIELD_BEGIN_TIME: &str = "beginTime";
pub(crate) const FIELD_APPLICATION_DATA: &str = "applicationData";
pub(crate) const FIELD_GMT_CREATE: &str = "gmtCreate";
pub(crate) const FIELD_GMT_MODIFIED: &str = "gmtModified";
pub(crate) const FIELD_BRANCH_ID: &str = "branchId";
pub(crate) const FIELD_RESOURCE_GROUP_ID: &str = "resourceGroupId";
pub(crate) const FIELD_RESOURCE_ID: &str = "resourceId";
pub(crate) const FIELD_CLIENT_ID: &str = "clientId";
pub(crate) const FIELD_BRANCH_TYPE: &str = "branchType";

/// Encodes a global record into its hash field map.
#[must_use]
pub fn encode_global(record: &GlobalRecord) -> Vec<(String, String)> {
    let mut fields = vec![
        (FIELD_XID.to_owned(), record.xid.clone()),
        (
            FIELD_TRANSACTION_ID.to_owned(),
            record.transaction_id.to_string(),
        ),
        (FIELD_STATUS.to_owned(), record.status.code().to_string()),
        (
            FIELD_APPLICATION_ID.to_owned(),
            record.application_id.clone(),
        ),
        (FIELD_SERVICE_GROUP.to_owned(), record.service_group.clone()),
        (FIELD_TX_NAME.to_owned(), record.tx_name.clone()),
        (FIELD_TIMEOUT.to_owned(), record.timeout.to_string()),
        (FIELD_BEGIN_TIME.to_owned(), record.begin_time.to_string()),
        (FIELD_GMT_CREATE.to_owned(), record.gmt_create.to_string()),
        (
            FIELD_GMT_MODIFIED.to_owned(),
            record.gmt_modified.to_string(),
        ),
    ];
    push_application_data(&mut fields, record.application_data.as_deref());
    fields
}

/// Decodes a global record from its hash field map.
#[must_use]
pub fn decode_global(pairs: &[(String, String)]) -> GlobalRecord {
    let map = field_map(pairs);
    GlobalRecord {
        xid: text(&map, FIELD_XID),
        transaction_id: integer(&map, FIELD_TRANSACTION_ID),
        status: GlobalStatus::from_code(integer::<StatusCode>(&map, FIELD_STATUS))
            .unwrap_or_default(),
        application_id: text(&map, FIELD_APPLICATION_ID),
        service_group: text(&map, FIELD_SERVICE_GROUP),
        tx_name: text(&map, FIELD_TX_NAME),
        timeout: integer(&map, FIELD_TIMEOUT),
        begin_time: integer::<EpochMillis>(&map, FIELD_BEGIN_TIME),
        application_data: optional_text(&map, FIELD_APPLICATION_DATA),
        gmt_create: integer::<EpochMillis>(&map, FIELD_GMT_CREATE),
        gmt_modified: integer::<EpochMillis>(&map, FIELD_GMT_MODIFIED),
    }
}

/// Encodes a branch record into its hash field map.
#[must_use]
pub fn encode_branch(record: &BranchRecord) -> Vec<(String, String)> {
    let mut fields = vec![
        (FIELD_BRANCH_ID.to_owned(), record.branch_id.to_string()),
        (FIELD_XID.to_owned(), record.xid.clone()),
        (
            FIELD_RESOURCE_GROUP_ID.to_owned(),
            record.resource_group_id.clone(),
        ),
        (FIELD_RESOURCE_ID.to_owned(), record.resource_id.clone()),
        (FIELD_CLIENT_ID.to_owned(), record.client_id.clone()),
        (
            FIELD_BRANCH_TYPE.to_owned(),
            record.branch_type.code().to_string(),
        ),
        (FIELD_STATUS.to_owned(), record.status.to_string()),
        (FIELD_GMT_CREATE.to_owned(), record.gmt_create.to_string()),
        (
            FIELD_GMT_MODIFIED.to_owned(),
            record.gmt_modified.to_string(),
        ),
    ];
    push_application_data(&mut fields, record.application_data.as_deref());
    fields
}

/// Decodes a branch record from its hash field map.
#[must_use]
pub fn decode_branch(pairs: &[(String, String)]) -> BranchRecord {
    let map = field_map(pairs);
    BranchRecord {
        branch_id: integer(&map, FIELD_BRANCH_ID),
        xid: text(&map, FIELD_XID),
        resource_group_id: text(&map, FIELD_RESOURCE_GROUP_ID),
        resource_id: text(&map, FIELD_RESOURCE_ID),
        client_id: text(&map, FIELD_CLIENT_ID),
        branch_type: BranchType::from_code(integer::<StatusCode>(&map, FIELD_BRANCH_TYPE))
            .unwrap_or_default(),
        status: integer::<StatusCode>(&map, FIELD_STATUS),
        application_data: optional_text(&map, FIELD_APPLICATION_DATA),
        gmt_create: integer::<EpochMillis>(&map, FIELD_GMT_CREATE),
        gmt_modified: integer::<EpochMillis>(&map, FIELD_GMT_MODIFIED),
    }
}

fn push_application_data(fields: &mut Vec<(String, String)>, application_data: Option<&str>) {
    if let Some(data) = application_data.filter(|data| !data.is_empty()) {
        fields.push((FIELD_APPLICATION_DATA.to_owned(), data.to_owned()));
    }
}

fn field_map(pairs: &[(String, String)]) -> HotMap<&str, &str> {
    pairs
        .iter()
        .map(|(field, value)| (field.as_str(), value.as_str()))
        .collect()
}

fn text(map: &HotMap<&str, &str>, field: &str) -> String {
    map.get(field).map_or_else(String::new, |value| (*value).to_owned())
}

fn optional_text(map: &HotMap<&str, &str>, field: &str) -> Option<String> {
    map.get(field)
        .filter(|value| !value.is_empty())
        .map(|value| (*value).to_owned())
}

fn integer<T>(map: &HotMap<&str, &str>, field: &str) -> T
where
    T: std::str::FromStr + Default,
{
    map.get(field)
        .and_then(|value| value.parse().ok())
        .unwrap_or_default()
}
