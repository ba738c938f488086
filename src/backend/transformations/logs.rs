use alloy_primitives::{keccak256, Address, LogData, B256};
use std::sync::LazyLock;

use crate::models::involvers::InvolverRole;
use crate::models::logs::{DataRequirement, EventPattern, LogClassification};

/// Known event shapes in priority order. A log is classified by the first
/// pattern it satisfies; later patterns are never consulted for it.
pub static EVENT_PATTERNS: LazyLock<Vec<EventPattern>> = LazyLock::new(|| {
    vec![
        // ERC-20 Transfer(from, to, value)
        pattern("Transfer", "Transfer(address,address,uint256)", 3, &[1, 2], DataRequirement::NonEmpty, InvolverRole::Erc20),
        // ERC-721 Transfer(from, to, tokenId), all indexed
        pattern("Transfer", "Transfer(address,address,uint256)", 4, &[1, 2], DataRequirement::Empty, InvolverRole::Nft),
        pattern("Approval", "Approval(address,address,uint256)", 3, &[1, 2], DataRequirement::NonEmpty, InvolverRole::Generic),
        pattern("Approval", "Approval(address,address,uint256)", 4, &[1, 2], DataRequirement::Empty, InvolverRole::Generic),
        // The `approved` flag is not indexed
        pattern("ApprovalForAll", "ApprovalForAll(address,address,bool)", 3, &[1, 2], DataRequirement::NonEmpty, InvolverRole::Generic),
        pattern("TransferSingle", "TransferSingle(address,address,address,uint256,uint256)", 4, &[1, 2, 3], DataRequirement::NonEmpty, InvolverRole::Generic),
        pattern("TransferBatch", "TransferBatch(address,address,address,uint256[],uint256[])", 4, &[1, 2, 3], DataRequirement::NonEmpty, InvolverRole::Generic),
        // Wrapped native token
        pattern("Deposit", "Deposit(address,uint256)", 2, &[1], DataRequirement::NonEmpty, InvolverRole::Erc20),
        pattern("Withdrawal", "Withdrawal(address,uint256)", 2, &[1], DataRequirement::NonEmpty, InvolverRole::Erc20),
    ]
});

fn pattern(
    name: &'static str,
    signature: &str,
    topic_count: usize,
    address_topics: &'static [usize],
    data: DataRequirement,
    role: InvolverRole,
) -> EventPattern {
    EventPattern {
        name,
        signature: keccak256(signature.as_bytes()),
        topic_count,
        address_topics,
        data,
        role,
    }
}

/// A topic holds an address when its high 12 bytes are zero.
pub fn is_padded_address(topic: &B256) -> bool {
    topic[..12].iter().all(|b| *b == 0)
}

/// Checks one log against one event shape.
pub fn match_log(
    log: &LogData,
    topic_count: usize,
    signature: B256,
    address_topics: &[usize],
    data: DataRequirement,
) -> bool {
    let topics = log.topics();
    if topics.len() != topic_count {
        return false;
    }
    if topics.first() != Some(&signature) {
        return false;
    }
    if !address_topics
        .iter()
        .all(|&index| topics.get(index).is_some_and(is_padded_address))
    {
        return false;
    }
    match data {
        DataRequirement::NonEmpty => !log.data.is_empty(),
        DataRequirement::Empty => log.data.is_empty(),
    }
}

impl EventPattern {
    pub fn matches(&self, log: &LogData) -> bool {
        match_log(log, self.topic_count, self.signature, self.address_topics, self.data)
    }
}

pub fn classify_with(patterns: &[EventPattern], log: &LogData) -> Option<LogClassification> {
    let pattern = patterns.iter().find(|pattern| pattern.matches(log))?;
    let topics = log.topics();
    Some(LogClassification {
        pattern: pattern.name,
        role: pattern.role,
        addresses: pattern
            .address_topics
            .iter()
            .map(|&index| Address::from_word(topics[index]))
            .collect(),
    })
}

pub trait LogClassifier {
    fn classify(&self) -> Option<LogClassification>;
}

impl LogClassifier for LogData {
    fn classify(&self) -> Option<LogClassification> {
        classify_with(&EVENT_PATTERNS, self)
    }
}

impl LogClassifier for alloy_primitives::Log {
    fn classify(&self) -> Option<LogClassification> {
        self.data.classify()
    }
}
