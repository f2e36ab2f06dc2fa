//! Biomedical literature retrieval.
//!
//! [`LiteratureSource`] is the seam the fusion service depends on;
//! [`PubMedClient`] implements it over NCBI E-utilities. All HTTP goes through
//! [`HttpTransport`] so callers and tests can substitute the wire.

mod pubmed;
mod throttle;
mod transport;
mod xml;

pub use pubmed::PubMedClient;
pub use throttle::Throttle;
pub use transport::{HttpTransport, ReqwestTransport};
pub use xml::parse_efetch_xml;

use crate::Result;
use crate::models::LiteratureRecord;

/// A searchable bibliographic index.
pub trait LiteratureSource: Send + Sync {
    /// Returns up to `limit` ids matching `term`, in the index's relevance order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SourceUnavailable`] on transport failure or a
    /// non-success status. Nothing is retried internally.
    fn search(&self, term: &str, limit: usize) -> Result<Vec<String>>;

    /// Fetches title, abstract and year for `ids`.
    ///
    /// An empty id list returns an empty result without a request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SourceUnavailable`] on transport failure or a
    /// non-success status.
    fn fetch(&self, ids: &[String]) -> Result<Vec<LiteratureRecord>>;
}
