use ethers::contract::abigen;

// Read-only token metadata, queried once the deployment is confirmed to check
// that the address really hosts the expected contract.
abigen!(
    TokenMetadata,
    r#"[
        function name() view returns (string)
        function symbol() view returns (string)
    ]"#
);
