use serde::Serialize;

/// Checkpoints of the unprotect flow, in emission order.
///
/// `RemovingWorkbookProtection` and `ProtectionFoundInSheets` are only emitted when the matching
/// markers were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnprotectStage {
    ReadingStructure,
    AnalyzingWorkbook,
    RemovingWorkbookProtection,
    ScanningWorksheets,
    ProtectionFoundInSheets,
    Repackaging,
    Completed,
}

impl UnprotectStage {
    /// Approximate completion percentage when this checkpoint is reached.
    pub fn percent(self) -> u8 {
        match self {
            UnprotectStage::ReadingStructure => 10,
            UnprotectStage::AnalyzingWorkbook => 25,
            UnprotectStage::RemovingWorkbookProtection => 40,
            UnprotectStage::ScanningWorksheets => 55,
            UnprotectStage::ProtectionFoundInSheets => 70,
            UnprotectStage::Repackaging => 90,
            UnprotectStage::Completed => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UnprotectStage::ReadingStructure => "Reading file structure",
            UnprotectStage::AnalyzingWorkbook => "Analyzing workbook",
            UnprotectStage::RemovingWorkbookProtection => "Removing workbook protection",
            UnprotectStage::ScanningWorksheets => "Scanning worksheets",
            UnprotectStage::ProtectionFoundInSheets => "Protection found in sheets",
            UnprotectStage::Repackaging => "Repackaging file",
            UnprotectStage::Completed => "Completed",
        }
    }
}

/// Caller-supplied progress sink. Invoked synchronously on the calling thread.
pub trait ProgressSink {
    fn checkpoint(&mut self, stage: UnprotectStage);
}

impl<F> ProgressSink for F
where
    F: FnMut(UnprotectStage),
{
    fn checkpoint(&mut self, stage: UnprotectStage) {
        self(stage)
    }
}

/// Sink that discards every checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn checkpoint(&mut self, _stage: UnprotectStage) {}
}
