//! Ledger input: raw rows, classification, and the read-only source seam.

pub mod classifier;
pub mod raw;
pub mod source;

pub use classifier::{
    classify_ledger, classify_opportunities, classify_opportunity, classify_trade,
    derive_outcome, infer_platform,
};
pub use raw::{parse_float_lenient, ClassifierDiagnostics, RawOpportunityRow, RawTradeRow};
pub use source::{fetch_with_retry, load_ledger, FetchPolicy, LedgerError, LedgerSource, LedgerView};
