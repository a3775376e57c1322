//! Splits an oversized user message into labeled parts.
//!
//! The completion backend sees every part as its own user turn. Non-final
//! parts ask the model to acknowledge and wait; the final part tells it that
//! all parts were sent. Each payload is the longest run of whole characters
//! that fits the byte budget (at least one character), so concatenating the
//! payloads restores the message.

use crate::error::ChunkError;

const FINAL_PART_INSTRUCTION: &str =
    "ALL PARTS SENT. Now you can continue processing the request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Public struct `MessageChunk` used across patchpal components.
pub struct MessageChunk<'a> {
    /// 1-based position of this part.
    pub index: usize,
    pub total: usize,
    pub payload: &'a str,
    pub is_final: bool,
}

impl MessageChunk<'_> {
    fn part_flag(&self) -> String {
        format!("PART {}/{}", self.index, self.total)
    }

    /// Text sent to the backend for this part.
    pub fn render(&self) -> String {
        if self.total == 1 {
            return self.payload.to_string();
        }
        let part_flag = self.part_flag();
        let mut lines = Vec::with_capacity(5);
        if !self.is_final {
            lines.push(format!(
                "Do not answer yet. \
                 This is just another part of the text I want to send you. \
                 Just receive and acknowledge as \"{part_flag} received\" \
                 and wait for the next part."
            ));
        }
        lines.push(format!("[START {part_flag}]"));
        lines.push(self.payload.to_string());
        lines.push(format!("[END {part_flag}]"));
        if self.is_final {
            lines.push(FINAL_PART_INSTRUCTION.to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone)]
/// Lazily yields the parts of a message in ascending order.
pub struct MessageChunks<'a> {
    message: &'a str,
    budget: usize,
    total: usize,
    next_index: usize,
    cursor: usize,
}

impl MessageChunks<'_> {
    pub fn total(&self) -> usize {
        self.total
    }
}

impl<'a> Iterator for MessageChunks<'a> {
    type Item = MessageChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.total {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        let is_final = self.next_index == self.total;
        let start = self.cursor;
        let end = part_end(self.message, start, self.budget);
        self.cursor = end;
        Some(MessageChunk {
            index: index + 1,
            total: self.total,
            payload: &self.message[start..end],
            is_final,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MessageChunks<'_> {}

/// Split `message` into parts of at most `budget` bytes.
///
/// Single-byte text yields exactly `ceil(len / budget)` parts. A multi-byte
/// character is never cut, so such text can take a few more; a character
/// wider than the whole budget travels alone in its own part.
pub fn split_user_message(
    message: &str,
    budget: usize,
) -> Result<MessageChunks<'_>, ChunkError> {
    if budget == 0 {
        return Err(ChunkError::BudgetExhausted);
    }
    let mut total = 0;
    let mut cursor = 0;
    while cursor < message.len() {
        cursor = part_end(message, cursor, budget);
        total += 1;
    }
    Ok(MessageChunks {
        message,
        budget,
        total: total.max(1),
        next_index: 0,
        cursor: 0,
    })
}

fn part_end(text: &str, start: usize, budget: usize) -> usize {
    let limit = start.saturating_add(budget);
    if limit >= text.len() {
        return text.len();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    if end > start {
        return end;
    }
    text[start..]
        .chars()
        .next()
        .map_or(text.len(), |first| start + first.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::{split_user_message, MessageChunk};
    use crate::error::ChunkError;

    const ACK_INSTRUCTION: &str = "acknowledge as";

    fn collect(message: &str, budget: usize) -> Vec<MessageChunk<'_>> {
        split_user_message(message, budget)
            .expect("split")
            .collect()
    }

    #[test]
    fn unit_message_within_budget_is_single_identical_chunk() {
        let chunks = collect("short message", 13);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
        assert_eq!(chunks[0].render(), "short message");
        assert_eq!(collect("", 4)[0].render(), "");
    }

    #[test]
    fn functional_split_yields_ceil_parts_that_reconstruct_message() {
        let message = "abcdefghijklmnopqrstuvwxyz";
        for budget in 1..=30 {
            let chunks = collect(message, budget);
            assert_eq!(chunks.len(), message.len().div_ceil(budget));
            let rebuilt = chunks.iter().map(|chunk| chunk.payload).collect::<String>();
            assert_eq!(rebuilt, message);
            assert!(chunks.iter().all(|chunk| chunk.total == chunks.len()));
        }
    }

    #[test]
    fn functional_only_final_part_lacks_acknowledge_instruction() {
        let chunks = collect("0123456789", 4);
        assert_eq!(chunks.len(), 3);
        let rendered = chunks.iter().map(MessageChunk::render).collect::<Vec<_>>();
        assert!(rendered[0].starts_with("Do not answer yet."));
        assert!(rendered[0].contains("acknowledge as \"PART 1/3 received\""));
        assert!(rendered[0].ends_with("[START PART 1/3]\n0123\n[END PART 1/3]"));
        assert!(rendered[1].contains(ACK_INSTRUCTION));
        assert!(!rendered[2].contains(ACK_INSTRUCTION));
        assert_eq!(
            rendered[2],
            "[START PART 3/3]\n89\n[END PART 3/3]\n\
             ALL PARTS SENT. Now you can continue processing the request."
        );
        assert_eq!(
            chunks.iter().map(|chunk| chunk.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn regression_split_respects_utf8_boundaries() {
        let message = "héllo wörld ✓ done";
        for budget in 1..=message.len() {
            let chunks = collect(message, budget);
            assert!(chunks.len() >= message.len().div_ceil(budget));
            let rebuilt = chunks.iter().map(|chunk| chunk.payload).collect::<String>();
            assert_eq!(rebuilt, message);
            for chunk in &chunks {
                assert!(!chunk.payload.is_empty(), "empty part at budget {budget}");
                assert!(
                    chunk.payload.len() <= budget || chunk.payload.chars().count() == 1,
                    "part {:?} exceeds budget {budget}",
                    chunk.payload
                );
            }
            assert!(chunks.last().is_some_and(|chunk| chunk.is_final));
        }
    }

    #[test]
    fn regression_wide_character_under_tiny_budget_is_one_part() {
        let chunks = collect("é", 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].payload, "é");

        let chunks = collect("aé✓", 2);
        let payloads = chunks.iter().map(|chunk| chunk.payload).collect::<Vec<_>>();
        assert_eq!(payloads, vec!["a", "é", "✓"]);
        assert_eq!(chunks[2].total, 3);
    }

    #[test]
    fn unit_zero_budget_is_rejected() {
        assert_eq!(
            split_user_message("anything", 0).map(|chunks| chunks.count()),
            Err(ChunkError::BudgetExhausted)
        );
    }

    #[test]
    fn unit_chunks_report_exact_size() {
        let mut chunks = split_user_message("0123456789", 3).expect("split");
        assert_eq!(chunks.len(), 4);
        chunks.next();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.total(), 4);
    }
}
