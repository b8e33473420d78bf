pub const BEST_AVAILABLE: &str = "bestvideo+bestaudio/best";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    BestAvailable,
    UltraHd8k,
    UltraHd4kHdr,
    UltraHd4k,
    Qhd1440,
    FullHd1080,
    Hd720,
    Sd480,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 8] = [
        QualityPreset::BestAvailable,
        QualityPreset::UltraHd8k,
        QualityPreset::UltraHd4kHdr,
        QualityPreset::UltraHd4k,
        QualityPreset::Qhd1440,
        QualityPreset::FullHd1080,
        QualityPreset::Hd720,
        QualityPreset::Sd480,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QualityPreset::BestAvailable => "Best Available",
            QualityPreset::UltraHd8k => "8K",
            QualityPreset::UltraHd4kHdr => "4K HDR",
            QualityPreset::UltraHd4k => "4K",
            QualityPreset::Qhd1440 => "1440p",
            QualityPreset::FullHd1080 => "1080p",
            QualityPreset::Hd720 => "720p",
            QualityPreset::Sd480 => "480p",
        }
    }

    pub fn max_height(&self) -> Option<u32> {
        match self {
            QualityPreset::BestAvailable => None,
            QualityPreset::UltraHd8k => Some(4320),
            QualityPreset::UltraHd4kHdr | QualityPreset::UltraHd4k => Some(2160),
            QualityPreset::Qhd1440 => Some(1440),
            QualityPreset::FullHd1080 => Some(1080),
            QualityPreset::Hd720 => Some(720),
            QualityPreset::Sd480 => Some(480),
        }
    }

    /// Matches by containment so labels such as "1080p (HD)" still resolve.
    /// "4K HDR" has to be tested before "4K".
    pub fn detect(token: &str) -> Option<QualityPreset> {
        if token == QualityPreset::BestAvailable.label() {
            return Some(QualityPreset::BestAvailable);
        }
        QualityPreset::ALL[1..]
            .iter()
            .copied()
            .find(|p| token.contains(p.label()))
    }

    pub fn expression(&self) -> String {
        match self {
            QualityPreset::BestAvailable => BEST_AVAILABLE.to_string(),
            // VP9.2 is the stream that carries HDR metadata.
            QualityPreset::UltraHd4kHdr => {
                "bestvideo[height<=2160][vcodec^=vp9.2]+bestaudio/best".to_string()
            }
            _ => match self.max_height() {
                Some(h) => format!("bestvideo[height<={}]+bestaudio/best", h),
                None => BEST_AVAILABLE.to_string(),
            },
        }
    }
}

/// Maps a quality choice or a raw format id to a yt-dlp `-f` expression.
///
/// Unrecognized tokens are passed through as literal format ids; best audio is
/// appended unless the token already combines streams with `+` or `/`.
pub fn select_format(token: Option<&str>) -> String {
    let token = match token.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return BEST_AVAILABLE.to_string(),
    };

    if let Some(preset) = QualityPreset::detect(token) {
        return preset.expression();
    }

    if token.contains('+') || token.contains('/') {
        token.to_string()
    } else {
        format!("{}+bestaudio/best", token)
    }
}
