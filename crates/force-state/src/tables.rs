//! redb table definitions for the FOrcE catalog.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).
//! Every key starts with `{system}/{tenant}/`.

use redb::TableDefinition;

/// Jobs keyed by `{system}/{tenant}/{job_id}`.
pub const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

/// Entity descriptors keyed by `{system}/{tenant}/{entity_uuid}`.
pub const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// FDU descriptors keyed by `{system}/{tenant}/{fdu_uuid}`.
pub const FDUS: TableDefinition<&str, &[u8]> = TableDefinition::new("fdus");

/// Virtual link descriptors keyed by `{system}/{tenant}/{vl_uuid}`.
pub const VIRTUAL_LINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("virtual_links");

/// Entity instances keyed by `{system}/{tenant}/{entity_uuid}/{instance_uuid}`.
pub const ENTITY_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("entity_records");

/// FDU instances keyed by `{system}/{tenant}/{fdu_uuid}/{instance_id}`.
pub const FDU_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("fdu_records");

/// FIM bindings keyed by `{system}/{tenant}/{fim_id}`.
pub const FIMS: TableDefinition<&str, &[u8]> = TableDefinition::new("fims");

/// Cloud bindings keyed by `{system}/{tenant}/{cloud_id}`.
pub const CLOUDS: TableDefinition<&str, &[u8]> = TableDefinition::new("clouds");
