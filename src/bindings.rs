//! Solidity contract ABI bindings for the campaign manager, ERC20,
//! and burn-and-mint bridge contracts.
//!
//! The bridge contracts follow the Circle CCTP V1 surface: tokens are
//! burned through the token messenger's `depositForBurn` and minted on
//! the destination chain by handing the attested message to the message
//! transmitter's `receiveMessage`.

use alloy::sol;

sol!(
    #![sol(all_derives = true, rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
);

sol!(
    #![sol(all_derives = true, rpc)]
    interface ITokenMessenger {
        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken
        ) external returns (uint64 nonce);
    }
);

sol!(
    #![sol(all_derives = true, rpc)]
    interface IMessageTransmitter {
        event MessageSent(bytes message);

        function receiveMessage(
            bytes calldata message,
            bytes calldata attestation
        ) external returns (bool success);
    }
);

sol!(
    #![sol(all_derives = true, rpc)]
    interface ICampaignManager {
        function getCampaigns() external view returns (address[] memory campaigns);

        /// All returned arrays are parallel, one entry per input address.
        function getCampaignData(address[] calldata campaigns)
            external
            view
            returns (
                string[] memory title,
                string[] memory description,
                uint256[] memory targetAmount,
                uint256[] memory currentAmount,
                uint256[] memory deadline,
                uint256[] memory userContribution,
                string[] memory status,
                address[] memory proposer
            );

        function deposit(uint256 amount, address campaign) external;

        function refund(address campaign) external;

        function withdraw(address campaign) external;
    }
);
