//! ABI definitions for the deployed contracts
//!
//! Each interface lists only the methods the client is allowed to call.

use alloy_sol_types::sol;

sol! {
    /// USD stable asset borrowed from the pool
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    /// Conditional tokens (ERC1155) holding the YES/NO outcome positions
    interface IConditionalTokens {
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function setApprovalForAll(address operator, bool approved) external;
        function isApprovedForAll(address account, address operator) external view returns (bool);
        function safeTransferFrom(address from, address to, uint256 id, uint256 amount, bytes data) external;
    }

    /// Share vault wrapping one outcome token
    interface IPositionVault {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function positionId() external view returns (uint256);
        function totalAssets() external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function withdraw(uint256 assets, address receiver, address owner) external returns (uint256 shares);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface ILendingPool {
        function totalDeposits() external view returns (uint256);
        function totalBorrows() external view returns (uint256);
        function availableLiquidity() external view returns (uint256);
        function getUtilizationRate() external view returns (uint256);
        function getCurrentRates() external view returns (uint256 depositRate, uint256 borrowRate);
        function sharesOf(address account) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function debtOf(address account) external view returns (uint256);
        function deposit(uint256 amount) external returns (uint256 shares);
        function withdraw(uint256 shares) external returns (uint256 amount);
        function borrow(uint256 amount) external;
        function repay(uint256 amount) external;
    }

    interface ICollateralManager {
        struct CollateralConfig {
            bool isActive;
            uint256 ltv;
            uint256 liquidationThreshold;
            uint256 liquidationBonus;
        }

        function getHealthFactor(address user) external view returns (uint256);
        function getMaxBorrowAmount(address user) external view returns (uint256);
        function getTotalCollateralValue(address user) external view returns (uint256);
        function isLiquidatable(address user) external view returns (bool);
        function getUserCollaterals(address user) external view returns (address[] vaults, uint256[] amounts);
        function getCollateralAmount(address user, address vault) external view returns (uint256);
        function getCollateralConfig(address vault) external view returns (CollateralConfig memory);
        function depositCollateral(address vault, uint256 amount) external;
        function withdrawCollateral(address vault, uint256 amount) external;
    }

    interface IPriceOracle {
        function getPriceData(address vault) external view returns (uint256 price, uint256 lastUpdated, bool isValid);
        function getPrice(address vault) external view returns (uint256);
    }
}
