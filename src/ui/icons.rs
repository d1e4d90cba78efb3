//! Terminal icons with plain-text fallbacks.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static MAKER: Emoji<'_, '_> = Emoji("📄 ", "[M]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");
pub static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[STOP]");
