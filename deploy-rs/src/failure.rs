/// Process exit status for any failed run.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// Coarse category of a top-level failure, used to pick a remediation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InsufficientFunds,
    NetworkError,
    Other,
}

impl FailureKind {
    /// Inspect every layer of the error chain. Insufficient funds wins over a
    /// network error since it is always a well-formed node reply.
    pub fn classify(err: &eyre::Report) -> Self {
        let messages: Vec<String> = err
            .chain()
            .map(|cause| cause.to_string().to_ascii_lowercase())
            .collect();

        if messages.iter().any(|m| is_insufficient_funds(m)) {
            FailureKind::InsufficientFunds
        } else if messages.iter().any(|m| is_network_error(m)) {
            FailureKind::NetworkError
        } else {
            FailureKind::Other
        }
    }

    pub fn remediation(self) -> &'static [&'static str] {
        match self {
            FailureKind::InsufficientFunds => &[
                "make sure the deployer account holds enough ETH to pay for gas",
                "on a testnet, request test ETH from a faucet",
            ],
            FailureKind::NetworkError => &[
                "check the network connection",
                "confirm the RPC URL is configured correctly",
            ],
            FailureKind::Other => &[],
        }
    }
}

fn is_insufficient_funds(msg: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "insufficient funds",
        "insufficient balance",
        "doesn't have enough funds",
        "not enough funds",
    ];
    PATTERNS.iter().any(|p| msg.contains(p))
}

fn is_network_error(msg: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "error sending request",
        "connection refused",
        "connection reset",
        "connection closed",
        "tcp connect error",
        "dns error",
        "failed to lookup address",
        "timed out",
        "network is unreachable",
    ];
    PATTERNS.iter().any(|p| msg.contains(p))
}

/// Log a top-level failure with its remediation hints and return the exit status.
pub fn report(err: &eyre::Report) -> u8 {
    let kind = FailureKind::classify(err);
    tracing::error!(kind = ?kind, error = ?err, "deployment failed");

    let hints = kind.remediation();
    if !hints.is_empty() {
        eprintln!();
        eprintln!("possible fixes:");
        for hint in hints {
            eprintln!("- {hint}");
        }
    }

    FAILURE_EXIT_CODE
}
