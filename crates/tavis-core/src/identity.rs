//! Identity resolution: external participant ids to canonical customer ids.
//!
//! Resolution scans the full record set for a matching external id; when no
//! match exists a new id is minted as `TVS-CUS-{SOURCE}-{YY}-{NNNN}` with
//! the next serial for that `(source, year)` prefix.

use chrono::{Datelike, Utc};

use crate::customer::{CustomerId, CustomerRecord, Source};

/// Prefix shared by all minted customer ids.
pub const ID_PREFIX: &str = "TVS-CUS";

/// Resolve `external_id` against the current record set, minting a new id
/// when no record matches.
///
/// The serial maximum is recomputed from the full record set on every call
/// rather than read from a persisted counter. Sequential single-threaded
/// processing is therefore race-free, but concurrent resolvers over the
/// same backing state can mint duplicate serials; a persisted per-`(source,
/// year)` counter behind a transaction or mutex is the production fix.
pub fn resolve(
  external_id: &str,
  records: &[CustomerRecord],
  source: Source,
) -> CustomerId {
  resolve_for_year(external_id, records, source, current_year_short())
}

/// Same as [`resolve`], with the two-digit year supplied by the caller.
pub fn resolve_for_year(
  external_id: &str,
  records: &[CustomerRecord],
  source: Source,
  year: u8,
) -> CustomerId {
  if let Some(existing) = records
    .iter()
    .find(|r| r.contact_info.external_id.as_deref() == Some(external_id))
  {
    return existing.customer_id.clone();
  }
  mint(records, source, year)
}

fn mint(records: &[CustomerRecord], source: Source, year: u8) -> CustomerId {
  let prefix = format!("{ID_PREFIX}-{}-{year:02}-", source.code());
  let max_serial = records
    .iter()
    .filter_map(|r| r.customer_id.as_str().strip_prefix(prefix.as_str()))
    .filter_map(|serial| serial.parse::<u32>().ok())
    .max()
    .unwrap_or(0);
  CustomerId(format!("{prefix}{:04}", max_serial + 1))
}

/// The current two-digit year, UTC.
pub fn current_year_short() -> u8 { (Utc::now().year() % 100) as u8 }
