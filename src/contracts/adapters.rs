//! Adapter and adapter-factory bindings
//!
//! Every factory deploys at most one adapter per (parent vault, underlying)
//! pair and exposes a deterministic lookup for it.

use alloy::sol;

sol! {
    /// Morpho Blue market parameters
    #[derive(Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct MarketParams {
        address loanToken;
        address collateralToken;
        address oracle;
        address irm;
        uint256 lltv;
    }

    /// Functions shared by every adapter
    #[sol(rpc)]
    interface IAdapter {
        /// Factory that deployed this adapter
        function factory() external view returns (address);

        /// Vault this adapter was deployed for
        function parentVault() external view returns (address);

        /// Allocation id covering the whole adapter
        function adapterId() external view returns (bytes32);

        /// Assets currently held through the adapter
        function realAssets() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IMorphoVaultV1Adapter {
        function morphoVaultV1() external view returns (address);
    }

    /// Plain and auto-compounding ERC-4626 adapters share this getter
    #[sol(rpc)]
    interface IERC4626Adapter {
        function erc4626Vault() external view returns (address);
    }

    #[sol(rpc)]
    interface ICompoundV3Adapter {
        function comet() external view returns (address);
        function cometRewards() external view returns (address);
    }

    #[sol(rpc)]
    interface IMorphoMarketV1Adapter {
        function morpho() external view returns (address);
        function marketParamsListLength() external view returns (uint256);
        function marketParamsList(uint256 index) external view returns (MarketParams memory);
    }

    #[sol(rpc)]
    interface IMorphoVaultV1AdapterFactory {
        function morphoVaultV1Adapter(address parentVault, address morphoVaultV1) external view returns (address);
        function isMorphoVaultV1Adapter(address account) external view returns (bool);
        function createMorphoVaultV1Adapter(address parentVault, address morphoVaultV1) external returns (address);
    }

    #[sol(rpc)]
    interface IERC4626AdapterFactory {
        function erc4626Adapter(address parentVault, address erc4626Vault) external view returns (address);
        function isERC4626Adapter(address account) external view returns (bool);
        function createERC4626Adapter(address parentVault, address erc4626Vault) external returns (address);
    }

    #[sol(rpc)]
    interface IERC4626AutoCompoundAdapterFactory {
        function erc4626AutoCompoundAdapter(address parentVault, address erc4626Vault) external view returns (address);
        function isERC4626AutoCompoundAdapter(address account) external view returns (bool);
        function createERC4626AutoCompoundAdapter(address parentVault, address erc4626Vault) external returns (address);
    }

    #[sol(rpc)]
    interface ICompoundV3AdapterFactory {
        function compoundV3Adapter(address parentVault, address comet) external view returns (address);
        function isCompoundV3Adapter(address account) external view returns (bool);
        function createCompoundV3Adapter(address parentVault, address comet, address cometRewards) external returns (address);
    }

    #[sol(rpc)]
    interface IMorphoMarketV1AdapterFactory {
        function morphoMarketV1Adapter(address parentVault, address morpho) external view returns (address);
        function isMorphoMarketV1Adapter(address account) external view returns (bool);
        function createMorphoMarketV1Adapter(address parentVault, address morpho) external returns (address);
    }
}
