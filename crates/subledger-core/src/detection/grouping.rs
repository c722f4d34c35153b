//! Pass 1: attribute messages to merchant candidates.

use std::collections::BTreeMap;

use subledger_gmail::Message;
use tracing::debug;

use super::model::MerchantCandidate;
use super::rules::RuleSet;
use super::sender::Sender;
use crate::merchant::{MerchantDatabase, normalize_name};

#[derive(Default)]
struct ProcessorGroup {
    /// Spelling used by the newest receipt.
    name: String,
    newest: i64,
    messages: Vec<(Message, Sender)>,
}

/// Filters senders and groups the survivors into candidates.
///
/// Direct senders group by domain. Payment-processor receipts group by the
/// merchant name mined from their text; receipts without one are dropped.
pub(crate) fn group_candidates(
    rules: &RuleSet,
    merchants: &MerchantDatabase,
    messages: &[Message],
) -> Vec<MerchantCandidate> {
    let mut direct: BTreeMap<String, Vec<(Message, Sender)>> = BTreeMap::new();
    let mut relayed: BTreeMap<String, ProcessorGroup> = BTreeMap::new();
    let mut dropped = 0_usize;

    for message in messages {
        let Some(sender) = Sender::parse(&message.from) else {
            dropped += 1;
            continue;
        };

        if rules.is_hard_excluded(&sender.domain) || rules.is_blocked(&sender.domain) {
            dropped += 1;
            continue;
        }
        if let Some(name) = &sender.display_name
            && rules.looks_like_individual(name, sender.quoted, sender.brand())
        {
            dropped += 1;
            continue;
        }

        if rules.is_payment_processor(&sender.domain) {
            let Some(name) = rules.extract_processor_merchant(&message.text()) else {
                debug!("No merchant name in processor message {}", message.id);
                dropped += 1;
                continue;
            };
            let group = relayed.entry(normalize_name(&name)).or_default();
            if group.messages.is_empty() || message.internal_date >= group.newest {
                group.name = name;
                group.newest = message.internal_date;
            }
            group.messages.push((message.clone(), sender));
        } else {
            direct
                .entry(sender.domain.clone())
                .or_default()
                .push((message.clone(), sender));
        }
    }

    let mut candidates = Vec::with_capacity(direct.len() + relayed.len());

    for (domain, group) in direct {
        let Some((messages, latest)) = sort_group(group) else {
            continue;
        };
        let text = messages
            .iter()
            .map(Message::text)
            .collect::<Vec<_>>()
            .join(" ");
        let merchant = merchants.find(&domain, &text).cloned();
        candidates.push(MerchantCandidate {
            domain,
            sender_address: latest.address,
            display_name: latest.display_name,
            messages,
            merchant,
            via_processor: false,
            extracted_name: None,
        });
    }

    for group in relayed.into_values() {
        let Some((messages, latest)) = sort_group(group.messages) else {
            continue;
        };
        let merchant = merchants.find_by_name(&group.name).cloned();
        candidates.push(MerchantCandidate {
            domain: latest.domain,
            sender_address: latest.address,
            display_name: latest.display_name,
            messages,
            merchant,
            via_processor: true,
            extracted_name: Some(group.name),
        });
    }

    debug!(
        "Grouped {} messages into {} candidates ({} dropped)",
        messages.len(),
        candidates.len(),
        dropped
    );
    candidates
}

/// Orders a group oldest first and returns the sender of the newest message.
fn sort_group(mut group: Vec<(Message, Sender)>) -> Option<(Vec<Message>, Sender)> {
    group.sort_by(|(a, _), (b, _)| {
        a.internal_date
            .cmp(&b.internal_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    let latest = group.last().map(|(_, sender)| sender.clone())?;
    let messages = group.into_iter().map(|(message, _)| message).collect();
    Some((messages, latest))
}
