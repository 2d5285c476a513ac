//! Vault bindings (ERC-4626 with timelocked curation)

use alloy::sol;

sol! {
    /// Timelocked multi-adapter vault
    ///
    /// Governed setters revert unless the exact calldata was first passed to
    /// `submit` and its `executableAt` has been reached.
    #[sol(rpc)]
    interface IVaultV2 {
        // ERC-4626 / ERC-20

        /// Returns the underlying asset
        function asset() external view returns (address);

        /// Returns total assets managed by the vault
        function totalAssets() external view returns (uint256);

        /// Returns total supply of vault shares
        function totalSupply() external view returns (uint256);

        /// Virtual shares used to mitigate inflation attacks
        function virtualShares() external view returns (uint256);

        /// Returns the name of the vault token
        function name() external view returns (string memory);

        /// Returns the symbol of the vault token
        function symbol() external view returns (string memory);

        /// Returns the decimals of the vault token
        function decimals() external view returns (uint8);

        /// Returns share balance of account
        function balanceOf(address account) external view returns (uint256);

        /// Converts shares to assets
        function convertToAssets(uint256 shares) external view returns (uint256);

        /// Deposit assets and receive shares
        function deposit(uint256 assets, address onBehalf) external returns (uint256 shares);

        /// Withdraw assets by burning shares
        function withdraw(uint256 assets, address receiver, address onBehalf) external returns (uint256 shares);

        /// Redeem shares for assets
        function redeem(uint256 shares, address receiver, address onBehalf) external returns (uint256 assets);

        // Roles

        function owner() external view returns (address);
        function curator() external view returns (address);
        function isSentinel(address account) external view returns (bool);
        function isAllocator(address account) external view returns (bool);

        /// Owner only, immediate
        function setOwner(address newOwner) external;

        /// Owner only, immediate
        function setCurator(address newCurator) external;

        /// Owner only, immediate
        function setIsSentinel(address account, bool newIsSentinel) external;

        // Fees

        function performanceFee() external view returns (uint256);
        function managementFee() external view returns (uint256);
        function performanceFeeRecipient() external view returns (address);
        function managementFeeRecipient() external view returns (address);
        function maxRate() external view returns (uint256);

        // Adapters and allocation

        function adaptersLength() external view returns (uint256);
        function adapters(uint256 index) external view returns (address);
        function isAdapter(address account) external view returns (bool);
        function adapterRegistry() external view returns (address);
        function liquidityAdapter() external view returns (address);
        function liquidityData() external view returns (bytes memory);

        function absoluteCap(bytes32 id) external view returns (uint256);
        function relativeCap(bytes32 id) external view returns (uint256);
        function allocation(bytes32 id) external view returns (uint256);

        /// Allocator only, immediate
        function allocate(address adapter, bytes memory data, uint256 assets) external;

        /// Allocator only, immediate
        function deallocate(address adapter, bytes memory data, uint256 assets) external;

        /// Allocator only, immediate
        function setLiquidityAdapterAndData(address newLiquidityAdapter, bytes memory newLiquidityData) external;

        /// Allocator only, immediate
        function setMaxRate(uint256 newMaxRate) external;

        // Timelock machinery

        /// Current delay of a governed function
        function timelock(bytes4 selector) external view returns (uint256);

        /// Timestamp at which submitted calldata becomes executable (0 if not submitted)
        function executableAt(bytes memory data) external view returns (uint256);

        /// Submit governed calldata; starts its timelock
        function submit(bytes memory data) external;

        /// Cancel pending governed calldata
        function revoke(bytes memory data) external;

        /// Execute several calls against the vault atomically
        function multicall(bytes[] memory data) external;

        // Governed functions

        function setIsAllocator(address account, bool newIsAllocator) external;
        function setAdapterRegistry(address newAdapterRegistry) external;
        function setIsAdapter(address account, bool newIsAdapter) external;
        function setPerformanceFee(uint256 newPerformanceFee) external;
        function setManagementFee(uint256 newManagementFee) external;
        function setPerformanceFeeRecipient(address newPerformanceFeeRecipient) external;
        function setManagementFeeRecipient(address newManagementFeeRecipient) external;
        function increaseAbsoluteCap(bytes memory idData, uint256 newAbsoluteCap) external;
        function increaseRelativeCap(bytes memory idData, uint256 newRelativeCap) external;
        function setForceDeallocatePenalty(address adapter, uint256 newForceDeallocatePenalty) external;
        function abdicate(bytes4 selector) external;
        function decreaseTimelock(bytes4 selector, uint256 newDuration) external;

        // Unguarded counterparts

        /// Lengthening a delay is always safe, applied immediately
        function increaseTimelock(bytes4 selector, uint256 newDuration) external;

        /// Curator or sentinel, immediate
        function decreaseAbsoluteCap(bytes memory idData, uint256 newAbsoluteCap) external;

        /// Curator or sentinel, immediate
        function decreaseRelativeCap(bytes memory idData, uint256 newRelativeCap) external;
    }

    /// Factory that deploys vaults
    #[sol(rpc)]
    interface IVaultV2Factory {
        function isVaultV2(address account) external view returns (bool);
    }

    /// Custom errors raised by the vault and the adapter factories
    interface IVaultErrors {
        error Abdicated();
        error AbsoluteCapExceeded();
        error AbsoluteCapNotDecreasing();
        error AbsoluteCapNotIncreasing();
        error AutomaticallyTimelocked();
        error CannotReceiveAssets();
        error CannotReceiveShares();
        error CannotSendAssets();
        error CannotSendShares();
        error CastOverflow();
        error DataAlreadyPending();
        error DataNotTimelocked();
        error FeeInvariantBroken();
        error FeeTooHigh();
        error MaxRateTooHigh();
        error NoCode();
        error NotAdapter();
        error NotInAdapterRegistry();
        error PenaltyTooHigh();
        error RelativeCapAboveOne();
        error RelativeCapExceeded();
        error RelativeCapNotDecreasing();
        error RelativeCapNotIncreasing();
        error TimelockNotDecreasing();
        error TimelockNotExpired();
        error TimelockNotIncreasing();
        error TransferFromReturnedFalse();
        error TransferFromReverted();
        error TransferReturnedFalse();
        error TransferReverted();
        error Unauthorized();
        error ZeroAbsoluteCap();
        error ZeroAddress();
        error ZeroAllocation();
        error AdapterAlreadyDeployed();
    }
}
