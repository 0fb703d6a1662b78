//! Bridge contract ABI definitions
//!
//! Uses alloy's sol! macro to generate the event and call types for both
//! sides of the bridge. Only the pieces the relayer touches are declared.

use alloy::sol;

sol! {
    /// Source chain bridge: locks deposits, releases withdrawals
    contract SourceBridge {
        event Deposit(address indexed token, address indexed recipient, uint256 amount);

        function withdraw(address token, address recipient, uint256 amount) external;
    }
}

sol! {
    /// Destination chain bridge: mints and burns wrapped tokens
    contract DestinationBridge {
        event Unwrap(
            address indexed underlying_token,
            address indexed wrapped_token,
            address frm,
            address indexed to,
            uint256 amount
        );

        function wrap(address underlying_token, address recipient, uint256 amount) external;
    }
}
