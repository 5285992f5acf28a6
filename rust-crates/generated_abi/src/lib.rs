use ethers::contract::abigen;

pub mod dice_game_types {
    use super::*;

    abigen!(
        DiceGame,
        r#"[
            event Roll(address indexed player, uint256 amount, uint256 roll)
            event Winner(address winner, uint256 amount)
            function prize() external view returns (uint256)
            function nonce() external view returns (uint256)
            function rollTheDice() external payable
        ]"#
    );
}

pub mod rigged_roll_types {
    use super::*;

    abigen!(
        RiggedRoll,
        r#"[
            event OwnershipTransferred(address indexed previousOwner, address indexed newOwner)
            function owner() external view returns (address)
            function riggedRoll() external
            function withdraw(address to, uint256 amount) external
            function transferOwnership(address newOwner) external
        ]"#
    );
}

/// Name of the roll-outcome event emitted by the dice game contract.
pub const ROLL_EVENT: &str = "Roll";

/// Name of the payout event emitted by the dice game contract.
pub const WINNER_EVENT: &str = "Winner";
