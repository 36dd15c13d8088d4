//! Maps raw contract logs onto [`DomainEvent`]s.
//!
//! Dispatch is on topic 0. Logs of unknown event types are dropped with a
//! debug trace so that contract upgrades adding events do not stop the
//! projector.

use crate::chain::RawLog;
use crate::chain::abi::{FlowUpdated as FlowUpdatedLog, SetAgent, VaultDeposit, VaultTransfer};
use crate::events::{DomainEvent, FlowUpdated};
use alloy::primitives::I256;
use alloy::primitives::aliases::I96;
use alloy::sol_types::{SolEvent, SolValue};
use tracing::debug;

/// Normalize one raw log, or `None` if it is not an event we understand.
pub fn normalize(log: &RawLog) -> Option<DomainEvent> {
    let Some(topic0) = log.topics.first() else {
        debug!(contract = %log.address, block = log.block_number, "Dropping anonymous log");
        return None;
    };

    let topic0 = *topic0;
    if topic0 == FlowUpdatedLog::SIGNATURE_HASH {
        let e = decode::<FlowUpdatedLog>(log)?;
        let Some(flow_rate) = widen_int96(e.flowRate) else {
            debug!(
                block = log.block_number,
                rate = %e.flowRate,
                "Dropping FlowUpdated with unrepresentable rate"
            );
            return None;
        };
        let description = decode_description(&e.userData);
        Some(DomainEvent::FlowUpdated(FlowUpdated {
            token: e.token,
            sender: e.sender,
            receiver: e.receiver,
            flow_rate,
            total_sender_flow_rate: e.totalSenderFlowRate,
            total_receiver_flow_rate: e.totalReceiverFlowRate,
            user_data: e.userData,
            description,
            block_number: log.block_number,
        }))
    } else if topic0 == VaultDeposit::SIGNATURE_HASH {
        let e = decode::<VaultDeposit>(log)?;
        Some(DomainEvent::VaultBalanceChanged {
            token: e.token,
            block_number: log.block_number,
        })
    } else if topic0 == VaultTransfer::SIGNATURE_HASH {
        let e = decode::<VaultTransfer>(log)?;
        Some(DomainEvent::VaultBalanceChanged {
            token: e.token,
            block_number: log.block_number,
        })
    } else if topic0 == SetAgent::SIGNATURE_HASH {
        let e = decode::<SetAgent>(log)?;
        Some(DomainEvent::AgentChanged {
            new_agent_address: e.agent,
        })
    } else {
        debug!(
            contract = %log.address,
            block = log.block_number,
            %topic0,
            "Dropping unrecognized event"
        );
        None
    }
}

fn decode<E: SolEvent>(log: &RawLog) -> Option<E> {
    match E::decode_raw_log(log.topics.iter().copied(), &log.data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(
                contract = %log.address,
                block = log.block_number,
                event = E::SIGNATURE,
                error = %e,
                "Dropping undecodable event"
            );
            None
        }
    }
}

fn widen_int96(rate: I96) -> Option<I256> {
    i128::try_from(rate)
        .ok()
        .and_then(|rate| I256::try_from(rate).ok())
}

/// `userData` carries an ABI-encoded string; anything else is no description.
pub fn decode_description(user_data: &[u8]) -> String {
    if user_data.is_empty() {
        return String::new();
    }
    match <(String,)>::abi_decode_params(user_data) {
        Ok((description,)) => description,
        Err(e) => {
            debug!(len = user_data.len(), error = %e, "Undecodable userData, using empty description");
            String::new()
        }
    }
}
