pub mod amount;
pub mod cascade;
pub mod check;
pub mod format;
pub mod line;
pub mod mapping;
pub mod report;

pub use cascade::{
    CascadeChecks, CascadeInput, CascadeResult, CascadeStep, CascadeSummary, Fee, InvoiceTotals,
    MissingLineHint,
};
pub use check::{CheckLevel, CheckResult, ValidationStatus};
pub use format::{FormatExtraction, FormatKind, FormatMatch};
pub use line::{
    AnnotatedLine, DerivedValue, FormulaAttempt, FormulaKind, LineFields, LineValidation,
    NumericTriple, TripleCheck, TripleField,
};
pub use mapping::{
    CellValue, ColumnMapping, ConsensusOutcome, MappingSource, MappingVote, Row, RowCheck,
    SolveOutcome, SolveValidation,
};
pub use report::{
    Diagnostic, InvoiceInput, InvoiceReport, LineSummary, MappingOrigin, MappingReport,
    OverallStatus,
};
