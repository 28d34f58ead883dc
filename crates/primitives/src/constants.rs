//! Account abstraction (ERC-4337)-related constants

/// Entry point smart contract
pub mod entry_point {
    /// Address of the canonical entry point smart contract
    pub const ADDRESS: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    /// Version of the entry point smart contract
    pub const VERSION: &str = "0.6.0";
}

/// Bundler
pub mod bundler {
    /// Default time interval for auto bundling mode (in seconds)
    pub const BUNDLE_INTERVAL: u64 = 10;
    /// Default mempool size that triggers a bundle in manual-threshold mode
    pub const BUNDLE_MAX_POOL_SIZE: usize = 100;
    /// Gas limit of the `handleOps` transaction
    pub const BUNDLE_GAS_LIMIT: u64 = 10_000_000;
}

/// User operation mempool
pub mod mempool {
    /// Percentage increase of both gas fees required to replace a user operation in the mempool
    pub const GAS_INCREASE_PERC: u64 = 10;
    /// How many blocks to scan backwards when the events cursor is not initialized yet
    pub const LATEST_SCAN_DEPTH: u64 = 1000;
}

/// User operation validation
pub mod validation {
    /// Entities (factory, sender/account, paymaster)
    pub mod entities {
        // 0 - factory, 1 - sender/account, 2 - paymaster
        pub const NUMBER_OF_LEVELS: usize = 3;

        pub const FACTORY: &str = "factory";
        pub const SENDER: &str = "account";
        pub const PAYMASTER: &str = "paymaster";

        pub const FACTORY_LEVEL: usize = 0;
        pub const SENDER_LEVEL: usize = 1;
        pub const PAYMASTER_LEVEL: usize = 2;

        pub const LEVEL_TO_ENTITY: [&str; NUMBER_OF_LEVELS] = [FACTORY, SENDER, PAYMASTER];
    }

    /// Reputation
    /// https://github.com/eth-infinitism/account-abstraction/blob/develop/eip/EIPS/eip-aa-rules.md#constants
    pub mod reputation {
        pub const MIN_INCLUSION_RATE_DENOMINATOR: u64 = 10;
        pub const THROTTLING_SLACK: u64 = 10;
        pub const BAN_SLACK: u64 = 50;

        /// The denominator used when the bundler tracks reputation for third parties
        /// instead of its own mempool
        pub const NON_BUNDLER_MIN_INCLUSION_RATE_DENOMINATOR: u64 = 100;
        pub const NON_BUNDLER_THROTTLING_SLACK: u64 = 10;
        pub const NON_BUNDLER_BAN_SLACK: u64 = 10;

        pub const SAME_SENDER_MEMPOOL_COUNT: usize = 4;
        pub const SAME_UNSTAKED_ENTITY_MEMPOOL_COUNT: usize = 10;
        pub const THROTTLED_ENTITY_MEMPOOL_COUNT: usize = 4;
        pub const THROTTLED_ENTITY_BUNDLE_COUNT: usize = 4;
        pub const INCLUSION_RATE_FACTOR: u64 = 10;
    }

    /// Simulation
    pub mod simulation {
        /// Gas that must be left for the verification step on top of the measured `preOpGas`
        pub const MIN_EXTRA_GAS: u64 = 2000;
        /// Gas limit used for the `simulateValidation` eth_call
        pub const SIMULATE_VALIDATION_GAS_LIMIT: u64 = 10_000_000;
    }
}

/// RPC
pub mod rpc {
    /// The default port for HTTP
    pub const HTTP_PORT: u16 = 3000;

    /// JSON-RPC error codes of the ERC-4337 namespace
    pub mod error_codes {
        /// Method not supported
        pub const METHOD_NOT_FOUND: i32 = -32601;
        /// Invalid params / malformed hex fields
        pub const INVALID_FIELDS: i32 = -32602;
        /// simulateValidation failed on the account
        pub const SIMULATE_VALIDATION: i32 = -32500;
        /// simulateValidation failed on the paymaster
        pub const SIMULATE_PAYMASTER_VALIDATION: i32 = -32501;
        /// Opcode or storage access rule violation
        pub const OPCODE_VALIDATION: i32 = -32502;
        /// User operation not valid in its time range
        pub const NOT_IN_TIME_RANGE: i32 = -32503;
        /// Entity banned or throttled
        pub const REPUTATION: i32 = -32504;
        /// Entity stake or unstake delay too low
        pub const INSUFFICIENT_STAKE: i32 = -32505;
        /// Signature aggregators are not supported
        pub const UNSUPPORTED_AGGREGATOR: i32 = -32506;
        /// Wallet or paymaster signature check failed
        pub const INVALID_SIGNATURE: i32 = -32507;
        /// Execution reverted during gas estimation
        pub const EXECUTION_REVERTED: i32 = -32521;
    }
}
