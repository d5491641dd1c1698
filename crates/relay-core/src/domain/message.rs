//! Outbound message: validation and multipart segmentation.
//!
//! # 分割ルール
//! - GSM 7-bit で表現できる本文: 1 通 160 septet、分割時は 1 セグメント 153 septet
//! - それ以外（UCS-2）: 1 通 70 code unit、分割時は 67 code unit
//! - GSM 拡張文字（`{` `}` `€` など）はエスケープ込みで 2 septet。途中で切らない

use serde::{Deserialize, Serialize};

use super::errors::SendError;
use super::ids::{JobId, OwnerId};
use super::job::Job;

const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";
const GSM7_EXTENSION: &str = "\u{0C}^{}\\[~]|€";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Gsm7,
    Ucs2,
}

impl Encoding {
    pub fn detect(text: &str) -> Self {
        let gsm = text
            .chars()
            .all(|c| GSM7_BASIC.contains(c) || GSM7_EXTENSION.contains(c));
        if gsm { Encoding::Gsm7 } else { Encoding::Ucs2 }
    }

    fn limits(self) -> (usize, usize) {
        match self {
            Encoding::Gsm7 => (160, 153),
            Encoding::Ucs2 => (70, 67),
        }
    }

    fn cost(self, c: char) -> usize {
        match self {
            Encoding::Gsm7 if GSM7_EXTENSION.contains(c) => 2,
            Encoding::Gsm7 => 1,
            Encoding::Ucs2 => c.len_utf16(),
        }
    }
}

/// Split `text` into the segments the transport sends as one multipart message.
pub fn divide_message(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let encoding = Encoding::detect(text);
    let (single, segment) = encoding.limits();
    let total: usize = text.chars().map(|c| encoding.cost(c)).sum();
    if total <= single {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for c in text.chars() {
        let cost = encoding.cost(c);
        if used + cost > segment {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += cost;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Accepts an optional leading `+` followed by 7 to 15 digits.
pub fn validate_destination(destination: &str) -> Result<(), SendError> {
    let digits = destination.strip_prefix('+').unwrap_or(destination);
    let plausible =
        (7..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
    if plausible {
        Ok(())
    } else {
        Err(SendError::MalformedDestination(destination.to_string()))
    }
}

/// What the dispatch loop hands to the send primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSms {
    pub job_id: JobId,
    pub owner: OwnerId,
    pub destination: String,
    pub payload: String,
}

impl OutboundSms {
    /// Build a message for a claimed job, rejecting records that cannot be sent.
    pub fn for_job(job: &Job, owner: &OwnerId) -> Result<Self, SendError> {
        let destination = job.destination.trim();
        validate_destination(destination)?;
        if job.payload.trim().is_empty() {
            return Err(SendError::EmptyPayload);
        }
        Ok(Self {
            job_id: job.id,
            owner: owner.clone(),
            destination: destination.to_string(),
            payload: job.payload.clone(),
        })
    }

    pub fn segments(&self) -> Vec<String> {
        divide_message(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::NewJob;
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    #[rstest]
    #[case("a".repeat(160), vec![160])]
    #[case("a".repeat(161), vec![153, 8])]
    #[case("a".repeat(306), vec![153, 153])]
    #[case("Привет".repeat(11) + "Прив", vec![70])]
    #[case("ж".repeat(71), vec![67, 4])]
    fn splits_on_encoding_limits(#[case] text: String, #[case] char_counts: Vec<usize>) {
        let parts = divide_message(&text);
        let counts: Vec<usize> = parts.iter().map(|p| p.chars().count()).collect();
        assert_eq!(counts, char_counts);
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn extension_characters_count_double_and_are_not_split() {
        assert_eq!(divide_message(&"{".repeat(80)).len(), 1);

        let parts = divide_message(&"{".repeat(81));
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), 76);
        assert_eq!(parts[1].chars().count(), 5);
    }

    #[test]
    fn detects_encoding() {
        assert_eq!(Encoding::detect("Hello €5 [ok]"), Encoding::Gsm7);
        assert_eq!(Encoding::detect("नमस्ते"), Encoding::Ucs2);
        assert!(divide_message("").is_empty());
    }

    #[rstest]
    #[case("9000000001", true)]
    #[case("+919000000001", true)]
    #[case("12345", false)]
    #[case("90000abc01", false)]
    #[case("", false)]
    #[case("+", false)]
    fn destination_validation(#[case] destination: &str, #[case] ok: bool) {
        assert_eq!(validate_destination(destination).is_ok(), ok);
    }

    #[test]
    fn outbound_rejects_blank_payload() {
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            NewJob::new("9000000001", "   "),
            Utc::now(),
        );
        let err = OutboundSms::for_job(&job, &OwnerId::new("U1")).unwrap_err();
        assert_eq!(err, SendError::EmptyPayload);
    }

    #[test]
    fn outbound_trims_destination() {
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            NewJob::new(" 9000000001 ", "A"),
            Utc::now(),
        );
        let sms = OutboundSms::for_job(&job, &OwnerId::new("U1")).unwrap();
        assert_eq!(sms.destination, "9000000001");
        assert_eq!(sms.segments(), vec!["A".to_string()]);
    }
}
