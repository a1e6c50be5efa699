/// Exit code reported when the transport never produced one: it could not be started, it was
/// killed by a signal, or its batch file could not be provisioned
pub const NO_EXIT_CODE: i32 = -1;

/// Result of one transport attempt for a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    /// Exit status of the transport, forwarded verbatim
    pub exit_code: i32,
    pub error_detail: Option<String>,
}

impl TransferOutcome {
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: 0,
            error_detail: None,
        }
    }

    /// Transport ran and reported failure
    #[must_use]
    pub fn exited(exit_code: i32, error_detail: Option<String>) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
            error_detail,
        }
    }

    /// Transport could not run at all
    #[must_use]
    pub fn not_run(error: &crate::Error) -> Self {
        Self {
            success: false,
            exit_code: NO_EXIT_CODE,
            error_detail: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.success {
            return write!(f, "ok");
        }
        match &self.error_detail {
            Some(detail) => write!(f, "failed ({}): {}", self.exit_code, detail),
            None => write!(f, "failed ({})", self.exit_code),
        }
    }
}

/// Result of listing a remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    pub outcome: TransferOutcome,
    /// Bare file names, in listing order
    pub entries: Vec<String>,
}

impl RemoteListing {
    #[must_use]
    pub fn failed(outcome: TransferOutcome) -> Self {
        Self {
            outcome,
            entries: vec![],
        }
    }
}
