use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::origin::Origin;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StateError};

/// Checksum format recorded when `finish` is given an empty one.
pub const DEFAULT_CHECKSUM_FORMAT: &str = "SHA-1, base64 encoded";

/// Description of one backup archive.
///
/// Built client-side with [`Metadata::new`], completed with
/// [`Metadata::finish`] once the archive's size and checksum are known, and
/// then handed to the catalog. The `stored` flag is only ever set by the
/// catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    id: Option<String>,
    notes: String,
    timestamp: OffsetDateTime,
    checksum: String,
    checksum_format: String,
    size: u64,
    origin: Origin,
    stored: bool,
    storage_location: Option<String>,
    finished: bool,
}

impl Default for Metadata {
    /// An empty record, still timestamped with the current time.
    fn default() -> Self {
        Self::with_clock(Origin::default(), "", &SystemClock)
    }
}

impl Metadata {
    pub fn new(origin: Origin, notes: impl Into<String>) -> Self {
        Self::with_clock(origin, notes, &SystemClock)
    }

    /// Like [`Metadata::new`], taking the creation time from `clock`.
    pub fn with_clock(origin: Origin, notes: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            id: None,
            notes: notes.into(),
            timestamp: clock.now(),
            checksum: String::new(),
            checksum_format: String::new(),
            size: 0,
            origin,
            stored: false,
            storage_location: None,
            finished: false,
        }
    }

    /// Attach the archive's size and checksum. Fails if already finished.
    pub fn finish(
        &mut self,
        size: u64,
        checksum: impl Into<String>,
        checksum_format: impl Into<String>,
    ) -> Result<()> {
        if self.is_finished() {
            return Err(StateError::Validation("metadata already finished".into()));
        }
        let format = checksum_format.into();
        self.finished = true;
        self.size = size;
        self.checksum = checksum.into();
        self.checksum_format = if format.is_empty() {
            DEFAULT_CHECKSUM_FORMAT.to_string()
        } else {
            format
        };
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Check the fields the catalog requires before inserting.
    ///
    /// The timestamp is always present, so an empty record is caught by its
    /// checksum, size and origin instead.
    pub fn validate(&self) -> Result<()> {
        if self.checksum.is_empty() {
            return Err(StateError::Validation("missing checksum".into()));
        }
        if self.size == 0 {
            return Err(StateError::Validation("missing size".into()));
        }
        if self.origin.environment().is_empty() {
            return Err(StateError::Validation("missing origin environment".into()));
        }
        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Pre-assign the id the catalog should insert this record under.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: OffsetDateTime) {
        self.timestamp = timestamp;
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn checksum_format(&self) -> &str {
        &self.checksum_format
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn stored(&self) -> bool {
        self.stored
    }

    pub fn storage_location(&self) -> Option<&str> {
        self.storage_location.as_deref()
    }

    pub fn set_storage_location(&mut self, location: impl Into<String>) {
        self.storage_location = Some(location.into());
    }

    /// Document written on insert. A new record is never stored yet,
    /// whatever this value says.
    pub(super) fn to_doc(&self) -> MetadataDoc {
        MetadataDoc {
            notes: self.notes.clone(),
            timestamp: self.timestamp,
            checksum: self.checksum.clone(),
            checksum_format: self.checksum_format.clone(),
            size: self.size,
            environment: self.origin.environment().to_string(),
            machine: self.origin.machine().to_string(),
            hostname: self.origin.hostname().to_string(),
            version: self.origin.version().to_string(),
            stored: false,
            storage_location: self.storage_location.clone(),
        }
    }

    pub(super) fn from_doc(id: String, doc: MetadataDoc) -> Self {
        Self {
            id: Some(id),
            notes: doc.notes,
            timestamp: doc.timestamp,
            checksum: doc.checksum,
            checksum_format: doc.checksum_format,
            size: doc.size,
            origin: Origin::new(doc.environment, doc.machine, doc.hostname, doc.version),
            stored: doc.stored,
            storage_location: doc.storage_location,
            finished: true,
        }
    }
}

/// Stored form of [`Metadata`]. The id is the document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct MetadataDoc {
    notes: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    checksum: String,
    #[serde(rename = "checksumformat")]
    checksum_format: String,
    size: u64,
    environment: String,
    machine: String,
    hostname: String,
    version: String,
    stored: bool,
    #[serde(
        rename = "storagelocation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    storage_location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use time::macros::datetime;

    fn origin() -> Origin {
        Origin::new("env-uuid", "0", "localhost", "2.0.1")
    }

    #[test]
    fn empty_record_is_timestamped_but_invalid() {
        let meta = Metadata::default();
        assert!(meta.timestamp().unix_timestamp() > 0);
        let err = meta.validate().unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    #[test]
    fn clock_supplies_timestamp() {
        let at = datetime!(2014-03-01 12:00 UTC);
        let meta = Metadata::with_clock(origin(), "nightly", &FixedClock(at));
        assert_eq!(meta.timestamp(), at);
        assert_eq!(meta.notes(), "nightly");
        assert!(meta.id().is_none());
        assert!(!meta.stored());
    }

    #[test]
    fn finish_defaults_format_and_only_once() {
        let mut meta = Metadata::new(origin(), "");
        assert!(meta.validate().is_err());

        meta.finish(42, "some hash", "").unwrap();
        assert_eq!(meta.size(), 42);
        assert_eq!(meta.checksum(), "some hash");
        assert_eq!(meta.checksum_format(), DEFAULT_CHECKSUM_FORMAT);
        meta.validate().unwrap();

        let err = meta.finish(7, "other", "md5").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(meta.size(), 42);
    }

    #[test]
    fn empty_checksum_still_counts_as_finished() {
        let mut meta = Metadata::new(origin(), "");
        meta.finish(42, "", "").unwrap();
        assert!(meta.is_finished());

        let err = meta.finish(7, "h", "md5").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(meta.size(), 42);
        assert_eq!(meta.checksum(), "");
    }

    #[test]
    fn validate_names_the_missing_field() {
        let mut meta = Metadata::new(origin(), "");
        meta.finish(0, "h", "").unwrap();
        assert!(meta.validate().unwrap_err().to_string().contains("size"));

        let mut meta = Metadata::new(Origin::default(), "");
        meta.finish(1, "h", "").unwrap();
        assert!(meta
            .validate()
            .unwrap_err()
            .to_string()
            .contains("origin environment"));
    }

    #[test]
    fn stored_doc_keeps_every_field() {
        let mut meta = Metadata::new(origin(), "N");
        meta.finish(42, "H", "sha256").unwrap();
        meta.set_storage_location("/var/backups/b1.tar.gz");

        let value = serde_json::to_value(meta.to_doc()).unwrap();
        assert_eq!(value["checksumformat"], "sha256");
        assert_eq!(value["storagelocation"], "/var/backups/b1.tar.gz");

        let doc: MetadataDoc = serde_json::from_value(value).unwrap();
        let back = Metadata::from_doc("b1".into(), doc);
        assert_eq!(back.id(), Some("b1"));
        assert!(back.is_finished());
        assert_eq!(back.timestamp(), meta.timestamp());
        assert_eq!(back.origin(), meta.origin());
        assert_eq!(back.storage_location(), meta.storage_location());
    }
}
