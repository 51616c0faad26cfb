//! Command builder for Anvil fork nodes.

/// Builder for the arguments of a forking Anvil process.
#[derive(Debug, Clone)]
pub struct AnvilCmdBuilder {
    fork_url: String,
    port: u16,
    chain_id: u64,
    storage_caching: bool,
    extra_args: Vec<String>,
}

impl AnvilCmdBuilder {
    /// Create a builder for a fork of `fork_url`.
    pub fn new(fork_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            fork_url: fork_url.into(),
            port: 8545,
            chain_id,
            storage_caching: false,
            extra_args: Vec::new(),
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Let Anvil cache forked state on disk.
    pub fn storage_caching(mut self, enabled: bool) -> Self {
        self.storage_caching = enabled;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--fork-url".to_string(),
            self.fork_url,
            "-p".to_string(),
            self.port.to_string(),
        ];

        if !self.storage_caching {
            cmd.push("--no-storage-caching".to_string());
        }

        cmd.push("--chain-id".to_string());
        cmd.push(self.chain_id.to_string());

        cmd.extend(self.extra_args);

        cmd
    }
}
