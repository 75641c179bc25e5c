//! Parsing of the `Accept` request header.

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub kind: String,
    pub subtype: String,
    pub quality: f32,
}

impl MediaRange {
    fn parse(input: &str) -> Option<Self> {
        let mut parts = input.split(';');

        let (kind, subtype) = parts.next()?.trim().split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() || (kind == "*" && subtype != "*") {
            return None;
        }

        let mut quality = 1.0;
        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("q") {
                quality = value.trim().parse::<f32>().ok()?;
                if !(0.0..=1.0).contains(&quality) {
                    return None;
                }
            }
        }

        Some(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            quality,
        })
    }

    fn specificity(&self, kind: &str, subtype: &str) -> Option<u8> {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", "*") => Some(0),
            (k, "*") if k == kind => Some(1),
            (k, s) if k == kind && s == subtype => Some(2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accept {
    ranges: Vec<MediaRange>,
}

impl Accept {
    /// Malformed ranges are dropped rather than failing the whole header.
    pub fn parse(header: &str) -> Self {
        let ranges = header.split(',').filter_map(MediaRange::parse).collect();
        Self { ranges }
    }

    pub fn ranges(&self) -> &[MediaRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Quality given to `mime` by the most specific matching range, `0.0` if none matches.
    pub fn quality(&self, mime: &str) -> f32 {
        let (kind, subtype) = split_mime(mime);

        let mut best: Option<(u8, f32)> = None;
        for range in &self.ranges {
            let Some(specificity) = range.specificity(&kind, &subtype) else {
                continue;
            };
            if best.is_none_or(|(current, _)| specificity > current) {
                best = Some((specificity, range.quality));
            }
        }

        best.map_or(0.0, |(_, quality)| quality)
    }

    /// Quality of an exact `type/subtype` range, ignoring wildcards.
    pub fn explicit_quality(&self, mime: &str) -> Option<f32> {
        let (kind, subtype) = split_mime(mime);

        self.ranges
            .iter()
            .find(|range| range.kind == kind && range.subtype == subtype)
            .map(|range| range.quality)
    }
}

fn split_mime(mime: &str) -> (String, String) {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    let (kind, subtype) = essence.split_once('/').unwrap_or((essence, ""));
    (kind.to_ascii_lowercase(), subtype.to_ascii_lowercase())
}
