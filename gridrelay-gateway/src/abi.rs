//! ABI du contrat EnergyGridDAO, limité aux fonctions et événements consommés.

alloy::sol! {
    interface IEnergyGridDAO {
        event MemberRegistered(address indexed member, uint256 timestamp);

        function getMemberInfo(address member) external view returns (
            bool isRegistered,
            uint256 energyCredits,
            uint256 invalidReportsCount,
            bool isTemporarilySuspended
        );

        function getSystemStats() external view returns (
            uint256 totalProduced,
            uint256 totalCredits,
            uint256 totalMembers,
            uint256 currentFeeRate
        );

        function getProposal(uint256 proposalId) external view returns (
            address proposer,
            string memory description,
            uint256 yesVotes,
            uint256 noVotes,
            uint256 endTime,
            bool executed
        );

        function getVotingCreditsInfo(address member) external view returns (
            uint256 currentCredits,
            uint256 maxCredits,
            uint256 monthsUntilNext
        );

        function registerMember() external;
        function reportEnergyProduction(uint256 energyAmount) external;
        function transferCredits(address to, uint256 amount) external;
        function createProposal(string calldata description) external returns (uint256 proposalId);
        function voteQuadratic(uint256 proposalId, bool support, uint256 intensity) external;
        function donateVotingCredits(address to, uint256 amount) external;
        function anonymousVoteQuadratic(uint256 proposalId, address voter, bool support, uint256 intensity) external;
    }
}
