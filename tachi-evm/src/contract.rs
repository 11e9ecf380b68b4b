//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface needed to pay for content:
//! - [`IERC20`]: token balance, allowance and approval
//! - [`IPaymentProcessor`]: settlement contract crediting publishers

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-20 interface for USDC-style tokens.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

sol! {
    /// Settlement contract that pulls approved tokens from the crawler and
    /// credits the publisher.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IPaymentProcessor {
        function payPublisher(address publisher, uint256 amount) external;
        function payPublisherByNFT(address nftContract, uint256 tokenId, uint256 amount) external;
    }
}
