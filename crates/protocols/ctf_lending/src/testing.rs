//! In-memory chain for tests
//!
//! `FakeChain` implements every contract proxy for a single user with a tiny
//! ledger that follows the deployed contracts' happy-path rules. Faults can
//! be injected per method, and every view and send is logged by name
//! (`"pool.borrow"`, `"manager.getHealthFactor"`, ...).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use accrue_contracts::{
    CollateralConfig, CollateralManager, ConditionalTokens, ContractSet, Erc20Token, LendingPool,
    PoolRates, PositionVault, PriceData, PriceOracle, UserCollaterals,
};
use accrue_core::units::pow10;
use accrue_core::{
    Address, ContractAddresses, ContractError, TxError, TxHash, VaultSide, WalletError, U256,
};
use async_trait::async_trait;
use wallet_client::{PendingTx, ReceiptSource, TxReceipt};

type Result<T> = std::result::Result<T, ContractError>;

/// Failure to inject into a named method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// User declines the signature request
    Reject,
    /// Transaction is mined with status 0
    Revert,
    /// Transaction is broadcast but never mined
    NeverMine,
    /// Signature prompt is never answered
    NeverSign,
    /// Read fails at the RPC layer
    ViewError,
}

#[derive(Debug, Clone)]
struct Ledger {
    outcome: HashMap<u64, U256>,
    ctf_approved: HashSet<Address>,
    shares: HashMap<VaultSide, U256>,
    share_allowance: HashMap<VaultSide, U256>,
    vault_assets: HashMap<VaultSide, U256>,
    collateral: HashMap<VaultSide, U256>,
    prices: HashMap<VaultSide, U256>,
    debt: U256,
    stable: U256,
    stable_allowance: U256,
    max_borrow: U256,
    liquidity: U256,
    ltv_bps: U256,
    health_factor: U256,
    borrow_rate: U256,
    deposit_rate: U256,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            outcome: HashMap::new(),
            ctf_approved: HashSet::new(),
            shares: HashMap::new(),
            share_allowance: HashMap::new(),
            vault_assets: HashMap::new(),
            collateral: HashMap::new(),
            prices: HashMap::from([
                (VaultSide::Yes, U256::from(65_000_000u64)),
                (VaultSide::No, U256::from(35_000_000u64)),
            ]),
            debt: U256::ZERO,
            stable: U256::ZERO,
            stable_allowance: U256::ZERO,
            max_borrow: U256::from(1_000u64) * pow10(6),
            liquidity: U256::from(1_000_000u64) * pow10(6),
            ltv_bps: U256::from(7_500u64),
            health_factor: U256::from(2u64) * pow10(18),
            borrow_rate: U256::ZERO,
            deposit_rate: U256::ZERO,
        }
    }
}

fn get(map: &HashMap<VaultSide, U256>, side: VaultSide) -> U256 {
    map.get(&side).copied().unwrap_or_default()
}

fn take(map: &mut HashMap<VaultSide, U256>, side: VaultSide, amount: U256) -> bool {
    let entry = map.entry(side).or_default();
    if *entry < amount {
        return false;
    }
    *entry -= amount;
    true
}

fn give(map: &mut HashMap<VaultSide, U256>, side: VaultSide, amount: U256) {
    *map.entry(side).or_default() += amount;
}

pub struct FakeChain {
    me: Weak<FakeChain>,
    user: Address,
    addresses: ContractAddresses,
    ledger: Mutex<Ledger>,
    faults: Mutex<HashMap<&'static str, Fault>>,
    views: Mutex<Vec<&'static str>>,
    sent: Mutex<Vec<&'static str>>,
    receipts: Mutex<HashMap<TxHash, Option<bool>>>,
    nonce: AtomicU64,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            user: Address::repeat_byte(0x42),
            addresses: ContractAddresses::default(),
            ledger: Mutex::new(Ledger::default()),
            faults: Mutex::new(HashMap::new()),
            views: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        })
    }

    /// The single account this chain serves
    pub fn user(&self) -> Address {
        self.user
    }

    /// Proxy set backed by this chain
    pub fn contracts(self: &Arc<Self>) -> ContractSet {
        ContractSet {
            addresses: self.addresses.clone(),
            token: self.clone(),
            ctf: self.clone(),
            vault_yes: Arc::new(FakeVault {
                chain: self.clone(),
                side: VaultSide::Yes,
            }),
            vault_no: Arc::new(FakeVault {
                chain: self.clone(),
                side: VaultSide::No,
            }),
            pool: self.clone(),
            manager: self.clone(),
            oracle: self.clone(),
        }
    }

    pub fn inject(&self, method: &'static str, fault: Fault) {
        self.faults.lock().unwrap().insert(method, fault);
    }

    pub fn clear_fault(&self, method: &'static str) {
        self.faults.lock().unwrap().remove(method);
    }

    /// Names of every read, in order
    pub fn views(&self) -> Vec<&'static str> {
        self.views.lock().unwrap().clone()
    }

    /// Names of every submitted transaction, in order
    pub fn sent(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_outcome_balance(&self, id: u64, amount: U256) {
        self.ledger.lock().unwrap().outcome.insert(id, amount);
    }

    pub fn set_price(&self, side: VaultSide, price: U256) {
        self.ledger.lock().unwrap().prices.insert(side, price);
    }

    pub fn set_collateral(&self, side: VaultSide, amount: U256) {
        self.ledger.lock().unwrap().collateral.insert(side, amount);
    }

    pub fn set_debt(&self, debt: U256) {
        self.ledger.lock().unwrap().debt = debt;
    }

    pub fn set_stable_balance(&self, amount: U256) {
        self.ledger.lock().unwrap().stable = amount;
    }

    pub fn set_max_borrow(&self, amount: U256) {
        self.ledger.lock().unwrap().max_borrow = amount;
    }

    pub fn set_borrow_rate(&self, per_second: U256) {
        self.ledger.lock().unwrap().borrow_rate = per_second;
    }

    pub fn outcome_balance(&self, id: u64) -> U256 {
        self.ledger
            .lock()
            .unwrap()
            .outcome
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    pub fn collateral(&self, side: VaultSide) -> U256 {
        get(&self.ledger.lock().unwrap().collateral, side)
    }

    pub fn debt(&self) -> U256 {
        self.ledger.lock().unwrap().debt
    }

    pub fn stable_balance(&self) -> U256 {
        self.ledger.lock().unwrap().stable
    }

    fn side_of(&self, vault: Address) -> Option<VaultSide> {
        if vault == self.addresses.vault_yes {
            Some(VaultSide::Yes)
        } else if vault == self.addresses.vault_no {
            Some(VaultSide::No)
        } else {
            None
        }
    }

    fn fault(&self, method: &'static str) -> Option<Fault> {
        self.faults.lock().unwrap().get(method).copied()
    }

    fn read<T>(&self, method: &'static str, f: impl FnOnce(&Ledger) -> T) -> Result<T> {
        self.views.lock().unwrap().push(method);
        if self.fault(method) == Some(Fault::ViewError) {
            return Err(WalletError::Rpc {
                code: -32000,
                message: format!("{} unavailable", method),
            }
            .into());
        }
        Ok(f(&self.ledger.lock().unwrap()))
    }

    /// Broadcast a transaction. `effect` returns false when the contract
    /// would revert, in which case the ledger is left untouched.
    async fn submit(
        &self,
        method: &'static str,
        effect: impl FnOnce(&mut Ledger) -> bool,
    ) -> Result<PendingTx> {
        self.sent.lock().unwrap().push(method);
        let fault = self.fault(method);
        match fault {
            Some(Fault::Reject) => return Err(TxError::UserRejected.into()),
            Some(Fault::NeverSign) => std::future::pending::<()>().await,
            _ => {}
        }

        let n = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        let tx_hash = TxHash::from(bytes);

        let outcome = match fault {
            Some(Fault::NeverMine) => None,
            Some(Fault::Revert) => Some(false),
            _ => {
                let mut ledger = self.ledger.lock().unwrap();
                let mut staged = ledger.clone();
                let ok = effect(&mut staged);
                if ok {
                    *ledger = staged;
                }
                Some(ok)
            }
        };
        self.receipts.lock().unwrap().insert(tx_hash, outcome);

        let source: Arc<dyn ReceiptSource> = self.me.upgrade().expect("chain alive");
        Ok(PendingTx::new(tx_hash, source))
    }
}

#[async_trait]
impl ReceiptSource for FakeChain {
    async fn receipt(&self, tx_hash: TxHash) -> std::result::Result<Option<TxReceipt>, TxError> {
        let outcome = self.receipts.lock().unwrap().get(&tx_hash).copied().flatten();
        Ok(outcome.map(|success| TxReceipt {
            tx_hash,
            block_number: 1,
            success,
        }))
    }
}

#[async_trait]
impl Erc20Token for FakeChain {
    async fn balance_of(&self, _account: Address) -> Result<U256> {
        self.read("token.balanceOf", |l| l.stable)
    }

    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256> {
        self.read("token.allowance", |l| l.stable_allowance)
    }

    async fn approve(&self, _spender: Address, amount: U256) -> Result<PendingTx> {
        self.submit("token.approve", |l| {
            l.stable_allowance = amount;
            true
        }).await
    }

    async fn transfer(&self, _to: Address, amount: U256) -> Result<PendingTx> {
        self.submit("token.transfer", |l| {
            if l.stable < amount {
                return false;
            }
            l.stable -= amount;
            true
        }).await
    }
}

#[async_trait]
impl ConditionalTokens for FakeChain {
    async fn balance_of(&self, _account: Address, id: U256) -> Result<U256> {
        let id = id.to::<u64>();
        self.read("ctf.balanceOf", |l| {
            l.outcome.get(&id).copied().unwrap_or_default()
        })
    }

    async fn is_approved_for_all(&self, _account: Address, operator: Address) -> Result<bool> {
        self.read("ctf.isApprovedForAll", |l| l.ctf_approved.contains(&operator))
    }

    async fn set_approval_for_all(&self, operator: Address, approved: bool) -> Result<PendingTx> {
        self.submit("ctf.setApprovalForAll", |l| {
            if approved {
                l.ctf_approved.insert(operator);
            } else {
                l.ctf_approved.remove(&operator);
            }
            true
        }).await
    }

    async fn safe_transfer_from(
        &self,
        _from: Address,
        _to: Address,
        id: U256,
        amount: U256,
        _data: Vec<u8>,
    ) -> Result<PendingTx> {
        let id = id.to::<u64>();
        self.submit("ctf.safeTransferFrom", |l| {
            let balance = l.outcome.entry(id).or_default();
            if *balance < amount {
                return false;
            }
            *balance -= amount;
            true
        }).await
    }
}

/// One outcome side's vault on a `FakeChain`
pub struct FakeVault {
    chain: Arc<FakeChain>,
    side: VaultSide,
}

impl FakeVault {
    fn address(&self) -> Address {
        self.chain.addresses.vault(self.side)
    }
}

#[async_trait]
impl PositionVault for FakeVault {
    async fn name(&self) -> Result<String> {
        let side = self.side;
        self.chain
            .read("vault.name", |_| format!("Accrue {} Vault", side))
    }

    async fn symbol(&self) -> Result<String> {
        let side = self.side;
        self.chain.read("vault.symbol", |_| format!("a{}", side))
    }

    async fn position_id(&self) -> Result<U256> {
        let id = self.side.position_id();
        self.chain.read("vault.positionId", |_| U256::from(id))
    }

    async fn total_assets(&self) -> Result<U256> {
        let side = self.side;
        self.chain
            .read("vault.totalAssets", |l| get(&l.vault_assets, side))
    }

    async fn total_supply(&self) -> Result<U256> {
        let side = self.side;
        self.chain
            .read("vault.totalSupply", |l| get(&l.vault_assets, side))
    }

    async fn balance_of(&self, _account: Address) -> Result<U256> {
        let side = self.side;
        self.chain.read("vault.balanceOf", |l| get(&l.shares, side))
    }

    async fn deposit(&self, assets: U256, _receiver: Address) -> Result<PendingTx> {
        let side = self.side;
        let vault = self.address();
        let id = side.position_id();
        self.chain.submit("vault.deposit", |l| {
            if !l.ctf_approved.contains(&vault) {
                return false;
            }
            let balance = l.outcome.entry(id).or_default();
            if *balance < assets {
                return false;
            }
            *balance -= assets;
            give(&mut l.shares, side, assets);
            give(&mut l.vault_assets, side, assets);
            true
        }).await
    }

    async fn withdraw(
        &self,
        assets: U256,
        _receiver: Address,
        _owner: Address,
    ) -> Result<PendingTx> {
        let side = self.side;
        let id = side.position_id();
        self.chain.submit("vault.withdraw", |l| {
            if !take(&mut l.shares, side, assets) || !take(&mut l.vault_assets, side, assets) {
                return false;
            }
            *l.outcome.entry(id).or_default() += assets;
            true
        }).await
    }

    async fn approve(&self, _spender: Address, amount: U256) -> Result<PendingTx> {
        let side = self.side;
        self.chain.submit("vault.approve", |l| {
            l.share_allowance.insert(side, amount);
            true
        }).await
    }
}

#[async_trait]
impl LendingPool for FakeChain {
    async fn total_deposits(&self) -> Result<U256> {
        self.read("pool.totalDeposits", |l| l.liquidity + l.debt)
    }

    async fn total_borrows(&self) -> Result<U256> {
        self.read("pool.totalBorrows", |l| l.debt)
    }

    async fn available_liquidity(&self) -> Result<U256> {
        self.read("pool.availableLiquidity", |l| l.liquidity)
    }

    async fn utilization_rate(&self) -> Result<U256> {
        self.read("pool.getUtilizationRate", |l| {
            let total = l.liquidity + l.debt;
            if total.is_zero() {
                U256::ZERO
            } else {
                l.debt * pow10(18) / total
            }
        })
    }

    async fn current_rates(&self) -> Result<PoolRates> {
        self.read("pool.getCurrentRates", |l| PoolRates {
            deposit_rate: l.deposit_rate,
            borrow_rate: l.borrow_rate,
        })
    }

    async fn shares_of(&self, _account: Address) -> Result<U256> {
        self.read("pool.sharesOf", |_| U256::ZERO)
    }

    async fn balance_of(&self, _account: Address) -> Result<U256> {
        self.read("pool.balanceOf", |_| U256::ZERO)
    }

    async fn debt_of(&self, _account: Address) -> Result<U256> {
        self.read("pool.debtOf", |l| l.debt)
    }

    async fn deposit(&self, _amount: U256) -> Result<PendingTx> {
        self.submit("pool.deposit", |_| true).await
    }

    async fn withdraw(&self, _shares: U256) -> Result<PendingTx> {
        self.submit("pool.withdraw", |_| true).await
    }

    async fn borrow(&self, amount: U256) -> Result<PendingTx> {
        self.submit("pool.borrow", |l| {
            if amount.is_zero() || amount > l.max_borrow || amount > l.liquidity {
                return false;
            }
            l.debt += amount;
            l.stable += amount;
            l.liquidity -= amount;
            l.max_borrow -= amount;
            true
        }).await
    }

    async fn repay(&self, amount: U256) -> Result<PendingTx> {
        self.submit("pool.repay", |l| {
            let actual = amount.min(l.debt);
            if l.stable_allowance < actual || l.stable < actual {
                return false;
            }
            l.debt -= actual;
            l.stable -= actual;
            l.stable_allowance -= actual;
            l.liquidity += actual;
            l.max_borrow += actual;
            true
        }).await
    }
}

#[async_trait]
impl CollateralManager for FakeChain {
    async fn health_factor(&self, _user: Address) -> Result<U256> {
        self.read("manager.getHealthFactor", |l| {
            if l.debt.is_zero() {
                U256::MAX
            } else {
                l.health_factor
            }
        })
    }

    async fn max_borrow_amount(&self, _user: Address) -> Result<U256> {
        self.read("manager.getMaxBorrowAmount", |l| l.max_borrow)
    }

    async fn total_collateral_value(&self, _user: Address) -> Result<U256> {
        self.read("manager.getTotalCollateralValue", |l| {
            [VaultSide::Yes, VaultSide::No]
                .into_iter()
                .map(|side| get(&l.collateral, side) * get(&l.prices, side) / pow10(20))
                .fold(U256::ZERO, |acc, v| acc + v)
        })
    }

    async fn is_liquidatable(&self, _user: Address) -> Result<bool> {
        self.read("manager.isLiquidatable", |_| false)
    }

    async fn user_collaterals(&self, _user: Address) -> Result<UserCollaterals> {
        let addresses = self.addresses.clone();
        self.read("manager.getUserCollaterals", |l| {
            let mut out = UserCollaterals::default();
            for side in [VaultSide::Yes, VaultSide::No] {
                let amount = get(&l.collateral, side);
                if !amount.is_zero() {
                    out.vaults.push(addresses.vault(side));
                    out.amounts.push(amount);
                }
            }
            out
        })
    }

    async fn collateral_amount(&self, _user: Address, vault: Address) -> Result<U256> {
        let side = self.side_of(vault);
        self.read("manager.getCollateralAmount", |l| {
            side.map(|s| get(&l.collateral, s)).unwrap_or_default()
        })
    }

    async fn collateral_config(&self, vault: Address) -> Result<CollateralConfig> {
        let active = self.side_of(vault).is_some();
        self.read("manager.getCollateralConfig", |l| CollateralConfig {
            is_active: active,
            ltv: l.ltv_bps,
            liquidation_threshold: U256::from(8_000u64),
            liquidation_bonus: U256::from(500u64),
        })
    }

    async fn deposit_collateral(&self, vault: Address, amount: U256) -> Result<PendingTx> {
        let side = self.side_of(vault);
        self.submit("manager.depositCollateral", |l| {
            let Some(side) = side else { return false };
            if get(&l.share_allowance, side) < amount || !take(&mut l.shares, side, amount) {
                return false;
            }
            take(&mut l.share_allowance, side, amount);
            give(&mut l.collateral, side, amount);
            true
        }).await
    }

    async fn withdraw_collateral(&self, vault: Address, amount: U256) -> Result<PendingTx> {
        let side = self.side_of(vault);
        self.submit("manager.withdrawCollateral", |l| {
            let Some(side) = side else { return false };
            if !l.debt.is_zero() || !take(&mut l.collateral, side, amount) {
                return false;
            }
            give(&mut l.shares, side, amount);
            true
        }).await
    }
}

#[async_trait]
impl PriceOracle for FakeChain {
    async fn price_data(&self, vault: Address) -> Result<PriceData> {
        let side = self.side_of(vault);
        self.read("oracle.getPriceData", |l| PriceData {
            price: side.map(|s| get(&l.prices, s)).unwrap_or_default(),
            last_updated: U256::from(1_700_000_000u64),
            is_valid: side.is_some(),
        })
    }

    async fn price(&self, vault: Address) -> Result<U256> {
        let side = self.side_of(vault);
        self.read("oracle.getPrice", |l| {
            side.map(|s| get(&l.prices, s)).unwrap_or_default()
        })
    }
}
