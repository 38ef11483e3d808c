//! Network consensus parameters.
//!
//! Three parameter sets exist: mainnet, testnet, regtest. Values are fixed
//! at construction; nothing here changes at runtime. Heights index the
//! two-entry upgrade arrays: `[0]` is the first mandatory upgrade, `[1]`
//! the second (the V0.5 kernel protocol activation).

use num_bigint::BigUint;
use obol_types::{Algo, Hash256, Script};
use std::str::FromStr;

/// Ratio between the modifier interval and the first selection section.
pub const MODIFIER_INTERVAL_RATIO: i64 = 3;

/// Which chain the node is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// One treasury payee: destination script and its percentage of the
/// treasury payment. The table is an ordered sequence because payee
/// position fixes output order, which fixes the txid.
#[derive(Debug, Clone)]
pub struct TreasuryPayee {
    pub script: Script,
    pub percent: u8,
}

/// Consensus parameters for one network.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    pub network: Network,
    pub genesis_hash: Hash256,
    /// Blocks between proof-of-work subsidy halvings.
    pub subsidy_halving_interval: u32,
    /// Mandatory upgrade heights; `[1]` activates the V0.5 kernel protocol.
    pub mandatory_upgrade_block: [u32; 2],
    /// Minimum header versions introduced at the upgrade blocks.
    pub upgrade_block_version: [i32; 2],
    /// Target block spacing in seconds.
    pub pow_target_spacing: i64,
    /// Low-order block-time bits that must be zero on PoS blocks.
    pub stake_timestamp_mask: u32,
    /// Minimum kernel depth before/after the first upgrade.
    pub stake_min_depth: [u32; 2],
    /// Minimum kernel age in seconds before/after the V0.5 upgrade.
    pub stake_min_age: [i64; 2],
    /// Coin-age accrual cap in seconds before/after the V0.5 upgrade.
    pub stake_max_age: [i64; 2],
    /// Seconds between stake modifier regenerations.
    pub modifier_interval: i64,
    /// Proof limits per algorithm.
    pub pow_limit_pos: BigUint,
    pub pow_limit_pow_sha256: BigUint,
    /// First height at which treasury payments occur.
    pub treasury_start_height: u32,
    /// Blocks per treasury payment cycle.
    pub treasury_cycle_blocks: u32,
    /// Share of the accumulated subsidy paid to the treasury, in percent.
    pub treasury_total_percent: u8,
    /// Ordered treasury payee table; percents are shares of the payment.
    pub treasury_payees: Vec<TreasuryPayee>,
    /// Hard checkpoints of stake modifier checksums.
    pub modifier_checkpoints: Vec<(u32, u32)>,
    /// Segwit activation height.
    pub segwit_height: u32,
    /// CSV activation height.
    pub csv_height: u32,
}

fn limit(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).expect("valid pow limit hex")
}

fn mainnet_treasury() -> Vec<TreasuryPayee> {
    // Ordered as the reference chain iterates them (script byte order).
    let dev_a = hex::decode("0254121b1cbfcb42e0d53410f0db9c1c51fc79a0a376dd3e0d3c7431915f9fed44")
        .expect("valid payee pubkey");
    let dev_b = hex::decode("03a728481601bb6f2e1873624fe15df816b0633b4c499406843c666800fbe45d5a")
        .expect("valid payee pubkey");
    let community: [u8; 20] = hex::decode("8369e8934167c47127ce0327964309a0b13a52cc")
        .expect("valid payee hash")
        .try_into()
        .expect("20 bytes");
    vec![
        TreasuryPayee {
            script: Script::new_p2pk(&dev_a),
            percent: 25,
        },
        TreasuryPayee {
            script: Script::new_p2pk(&dev_b),
            percent: 25,
        },
        TreasuryPayee {
            script: Script::new_p2sh(&community),
            percent: 50,
        },
    ]
}

impl ConsensusParams {
    pub fn mainnet() -> Self {
        ConsensusParams {
            network: Network::Mainnet,
            genesis_hash: Hash256::from_str(
                "f4bbfc518aa3622dbeb8d2818a606b82c2b8b1ac2f28553ebdb6fc04d7abaccf",
            )
            .expect("valid genesis hash"),
            subsidy_halving_interval: 100_000,
            mandatory_upgrade_block: [1_030_000, 1_450_000],
            upgrade_block_version: [8, 9],
            pow_target_spacing: 80,
            stake_timestamp_mask: 0xf, // 16 second slots
            stake_min_depth: [200, 600],
            stake_min_age: [2 * 60 * 60, 12 * 60 * 60],
            stake_max_age: [14 * 24 * 60 * 60, 30 * 24 * 60 * 60],
            modifier_interval: 60,
            pow_limit_pos: limit(
                "00000fffff000000000000000000000000000000000000000000000000000000",
            ),
            pow_limit_pow_sha256: limit(
                "0000ffff00000000000000000000000000000000000000000000000000000000",
            ),
            treasury_start_height: 1_030_000,
            treasury_cycle_blocks: 24 * 60 * 60 / 80, // once per day
            treasury_total_percent: 10,
            treasury_payees: mainnet_treasury(),
            modifier_checkpoints: vec![(0, 0xfd11_f4e7)],
            segwit_height: 1_450_000,
            csv_height: 1,
        }
    }

    pub fn testnet() -> Self {
        ConsensusParams {
            network: Network::Testnet,
            genesis_hash: Hash256::from_str(
                "64aaacff5d8b95634776c67435e50d69b295012e34883be90e0a5efdc9dc0857",
            )
            .expect("valid genesis hash"),
            subsidy_halving_interval: 210_000,
            mandatory_upgrade_block: [0, 0],
            upgrade_block_version: [0, 0],
            pow_target_spacing: 64,
            stake_timestamp_mask: 0xf,
            stake_min_depth: [100, 100],
            stake_min_age: [60 * 60, 60 * 60],
            stake_max_age: [30 * 24 * 60 * 60, 30 * 24 * 60 * 60],
            modifier_interval: 60,
            pow_limit_pos: limit(
                "000000ffff000000000000000000000000000000000000000000000000000000",
            ),
            pow_limit_pow_sha256: limit(
                "000000ffff000000000000000000000000000000000000000000000000000000",
            ),
            treasury_start_height: 1_000,
            treasury_cycle_blocks: 24 * 6 * 60 / 64,
            treasury_total_percent: 10,
            treasury_payees: mainnet_treasury(),
            modifier_checkpoints: vec![(0, 0xfd11_f4e7)],
            segwit_height: 0,
            csv_height: 1,
        }
    }

    pub fn regtest() -> Self {
        ConsensusParams {
            network: Network::Regtest,
            genesis_hash: Hash256::from_str(
                "5ac5f7b6f45daac7b5250f1023b6d5b5402407b49a3adb1c6834d59eabef5229",
            )
            .expect("valid genesis hash"),
            subsidy_halving_interval: 150,
            mandatory_upgrade_block: [0, 0],
            upgrade_block_version: [0, 0],
            pow_target_spacing: 32,
            stake_timestamp_mask: 0x3, // 4 second slots
            stake_min_depth: [0, 0],
            stake_min_age: [60 * 60, 60 * 60],
            stake_max_age: [30 * 24 * 60 * 60, 30 * 24 * 60 * 60],
            modifier_interval: 60,
            pow_limit_pos: limit(
                "7fffff0000000000000000000000000000000000000000000000000000000000",
            ),
            pow_limit_pow_sha256: limit(
                "7fffff0000000000000000000000000000000000000000000000000000000000",
            ),
            treasury_start_height: 1_000,
            treasury_cycle_blocks: 24 * 6 * 60 / 32,
            treasury_total_percent: 10,
            treasury_payees: Vec::new(),
            modifier_checkpoints: Vec::new(),
            segwit_height: 0,
            csv_height: 432,
        }
    }

    pub fn is_regtest(&self) -> bool {
        self.network == Network::Regtest
    }

    /// Whether the V0.5 kernel protocol applies at `height`.
    pub fn is_kernel_v05(&self, height: u32) -> bool {
        height >= self.mandatory_upgrade_block[1]
    }

    /// Minimum kernel age in effect at `height`.
    pub fn stake_min_age(&self, height: u32) -> i64 {
        if self.is_kernel_v05(height) {
            self.stake_min_age[1]
        } else {
            self.stake_min_age[0]
        }
    }

    /// Minimum kernel depth in effect at `height`.
    pub fn stake_min_depth(&self, height: u32) -> u32 {
        if height >= self.mandatory_upgrade_block[0] {
            self.stake_min_depth[1]
        } else {
            self.stake_min_depth[0]
        }
    }

    /// Coin-age accrual cap in effect at `height`.
    pub fn stake_max_age(&self, height: u32) -> i64 {
        if self.is_kernel_v05(height) {
            self.stake_max_age[1]
        } else {
            self.stake_max_age[0]
        }
    }

    /// Proof limit for `algo`.
    pub fn pow_limit(&self, algo: Algo) -> &BigUint {
        match algo {
            Algo::Pos => &self.pow_limit_pos,
            Algo::PowSha256 => &self.pow_limit_pow_sha256,
        }
    }

    /// Whether segwit rules are active for a block at `height`.
    pub fn is_segwit_active(&self, height: u32) -> bool {
        height >= self.segwit_height
    }

    /// Whether CSV (median-time-past locktimes) is active at `height`.
    pub fn is_csv_active(&self, height: u32) -> bool {
        height >= self.csv_height
    }
}
