//! ABI of the contracts the projector reads from.
//!
//! Event signatures must match the deployed contracts byte for byte, since
//! topic 0 of every log is the keccak hash of the signature.

use alloy::sol;

sol! {
    /// Constant flow agreement (CFA v1).
    #[derive(Debug, PartialEq, Eq)]
    event FlowUpdated(
        address indexed token,
        address indexed sender,
        address indexed receiver,
        int96 flowRate,
        int256 totalSenderFlowRate,
        int256 totalReceiverFlowRate,
        bytes userData
    );

    /// Emitted by the app when tokens are deposited into the agent vault.
    #[derive(Debug, PartialEq, Eq)]
    event VaultDeposit(address indexed token, address indexed sender, uint256 amount);

    /// Emitted by the app when tokens leave the agent vault.
    #[derive(Debug, PartialEq, Eq)]
    event VaultTransfer(address indexed token, address indexed to, uint256 amount);

    /// Emitted by the app when its agent is replaced.
    #[derive(Debug, PartialEq, Eq)]
    event SetAgent(address indexed agent);

    #[sol(rpc)]
    interface IFlowApp {
        function agent() external view returns (address);
        function getInitializationBlock() external view returns (uint256);
        function getCFAv1LiquidationPeriod(address host, address token) external view returns (uint256);
    }

    #[sol(rpc)]
    interface ISuperToken {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function getUnderlyingToken() external view returns (address);
    }

    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
    }
}
