//! Tier policy: what each subscription tier is entitled to.

use crate::artifact::OutputFormat;
use crate::jobs::JobPriority;

use super::UserTier;

/// Priority assigned to every job a user of this tier creates.
pub fn tier_priority(tier: UserTier) -> JobPriority {
    match tier {
        UserTier::Basic => JobPriority::Low,
        UserTier::Premium => JobPriority::Normal,
        UserTier::Vip => JobPriority::High,
    }
}

/// Formats a full novel download is bound to for this tier.
pub fn tier_formats(tier: UserTier) -> Vec<OutputFormat> {
    match tier {
        UserTier::Basic => vec![OutputFormat::Json, OutputFormat::Epub],
        UserTier::Premium => vec![
            OutputFormat::Json,
            OutputFormat::Epub,
            OutputFormat::Text,
            OutputFormat::Pdf,
            OutputFormat::Mobi,
            OutputFormat::Docx,
            OutputFormat::Azw3,
            OutputFormat::Fb2,
        ],
        UserTier::Vip => OutputFormat::ALL.to_vec(),
    }
}
