//! ERC20 bindings for the vault's underlying asset

use alloy::sol;

sol! {
    /// Standard ERC20 interface
    #[sol(rpc)]
    interface IERC20 {
        /// Returns the name of the token
        function name() external view returns (string memory);

        /// Returns the symbol of the token
        function symbol() external view returns (string memory);

        /// Returns the decimals of the token
        function decimals() external view returns (uint8);

        /// Returns the balance of an account
        function balanceOf(address account) external view returns (uint256);

        /// Returns the allowance of a spender
        function allowance(address owner, address spender) external view returns (uint256);

        /// Approves a spender to spend tokens
        function approve(address spender, uint256 amount) external returns (bool);
    }
}
