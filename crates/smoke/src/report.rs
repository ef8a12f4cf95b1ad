use std::fmt;

const RULE: &str = "======================================================================";

/// Detections found in one image, as `(class name, confidence)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReport {
    pub name: String,
    pub detections: Vec<(String, f32)>,
}

/// Counts in first-seen order.
fn tally<'a>(names: impl Iterator<Item = (&'a str, usize)>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for (name, n) in names {
        match counts.iter_mut().find(|(c, _)| c == name) {
            Some((_, count)) => *count += n,
            None => counts.push((name.to_string(), n)),
        }
    }
    counts
}

fn display_name(name: &str) -> String {
    name.replace('_', " ")
}

impl ImageReport {
    pub fn new(name: impl Into<String>, detections: Vec<(String, f32)>) -> Self {
        Self {
            name: name.into(),
            detections,
        }
    }

    pub fn average_confidence(&self) -> f32 {
        if self.detections.is_empty() {
            return 0.0;
        }
        self.detections.iter().map(|(_, c)| c).sum::<f32>() / self.detections.len() as f32
    }

    pub fn highest(&self) -> Option<f32> {
        self.detections.iter().map(|(_, c)| *c).reduce(f32::max)
    }

    pub fn lowest(&self) -> Option<f32> {
        self.detections.iter().map(|(_, c)| *c).reduce(f32::min)
    }
}

impl fmt::Display for ImageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        if self.detections.is_empty() {
            return writeln!(f, "   No objects detected");
        }

        writeln!(f, "   Found {} object(s)", self.detections.len())?;
        for (name, confidence) in &self.detections {
            writeln!(f, "      {}: {:.1}%", display_name(name), confidence * 100.0)?;
        }
        writeln!(f, "   Avg confidence: {:.1}%", self.average_confidence() * 100.0)?;
        if let (Some(high), Some(low)) = (self.highest(), self.lowest()) {
            writeln!(f, "   Highest: {:.1}%", high * 100.0)?;
            writeln!(f, "   Lowest: {:.1}%", low * 100.0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    NoDetections,
    LowConfidence,
    Moderate,
    Good,
}

impl Recommendation {
    pub fn from_average(total_detections: usize, average_confidence: f32) -> Self {
        if total_detections == 0 {
            Recommendation::NoDetections
        } else if average_confidence < 0.5 {
            Recommendation::LowConfidence
        } else if average_confidence < 0.7 {
            Recommendation::Moderate
        } else {
            Recommendation::Good
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recommendation::NoDetections => "No objects detected, check that the model is trained properly",
            Recommendation::LowConfidence => "Low confidence, the model may need more training",
            Recommendation::Moderate => "Moderate performance, consider more training epochs",
            Recommendation::Good => "Good performance, the model is detecting well",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub reports: Vec<ImageReport>,
    pub missing: Vec<String>,
}

impl Summary {
    pub fn new(reports: Vec<ImageReport>, missing: Vec<String>) -> Self {
        Self { reports, missing }
    }

    pub fn total_detections(&self) -> usize {
        self.reports.iter().map(|r| r.detections.len()).sum()
    }

    pub fn average_confidence(&self) -> f32 {
        let total = self.total_detections();
        if total == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .reports
            .iter()
            .flat_map(|r| r.detections.iter().map(|(_, c)| c))
            .sum();
        sum / total as f32
    }

    /// Overall per-class counts, most frequent first.
    pub fn class_distribution(&self) -> Vec<(String, usize)> {
        let mut counts = tally(
            self.reports
                .iter()
                .flat_map(|r| r.detections.iter().map(|(name, _)| (name.as_str(), 1))),
        );
        // Stable sort keeps first-seen order among equal counts.
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    pub fn recommendation(&self) -> Recommendation {
        Recommendation::from_average(self.total_detections(), self.average_confidence())
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "SMOKE TEST SUMMARY")?;
        writeln!(f, "{RULE}")?;

        writeln!(f, "\nOverall:")?;
        writeln!(f, "   Images tested: {}", self.reports.len())?;
        if !self.missing.is_empty() {
            writeln!(f, "   Images missing: {}", self.missing.len())?;
        }
        writeln!(f, "   Total detections: {}", self.total_detections())?;
        if self.total_detections() > 0 {
            writeln!(f, "   Average confidence: {:.1}%", self.average_confidence() * 100.0)?;
        }

        writeln!(f, "\nPer image:")?;
        for report in &self.reports {
            writeln!(
                f,
                "   {}: {} objects ({:.1}% avg)",
                report.name,
                report.detections.len(),
                report.average_confidence() * 100.0
            )?;
        }
        for missing in &self.missing {
            writeln!(f, "   {missing}: not found")?;
        }

        writeln!(f, "\nObject type distribution:")?;
        let distribution = self.class_distribution();
        if distribution.is_empty() {
            writeln!(f, "   No objects detected across all images")?;
        }
        for (name, count) in distribution {
            writeln!(f, "   {}: {count}", display_name(&name))?;
        }

        writeln!(f, "\nRecommendation:")?;
        writeln!(f, "   {}", self.recommendation())?;
        write!(f, "{RULE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, detections: &[(&str, f32)]) -> ImageReport {
        ImageReport::new(
            name,
            detections.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
        )
    }

    #[test]
    fn test_image_statistics() {
        let r = report("a.png", &[("Fire_Alarm", 0.9), ("Oxygen_Tank", 0.5), ("Fire_Alarm", 0.7)]);

        assert!((r.average_confidence() - 0.7).abs() < 1e-6);
        assert_eq!(r.highest(), Some(0.9));
        assert_eq!(r.lowest(), Some(0.5));
    }

    #[test]
    fn test_empty_image_report() {
        let r = report("empty.png", &[]);

        assert_eq!(r.average_confidence(), 0.0);
        assert_eq!(r.highest(), None);
        assert!(r.to_string().contains("No objects detected"));
    }

    #[test]
    fn test_recommendation_tiers() {
        assert_eq!(Recommendation::from_average(0, 0.0), Recommendation::NoDetections);
        assert_eq!(Recommendation::from_average(3, 0.49), Recommendation::LowConfidence);
        assert_eq!(Recommendation::from_average(3, 0.5), Recommendation::Moderate);
        assert_eq!(Recommendation::from_average(3, 0.69), Recommendation::Moderate);
        assert_eq!(Recommendation::from_average(3, 0.7), Recommendation::Good);
    }

    #[test]
    fn test_summary_aggregates_across_images() {
        let summary = Summary::new(
            vec![
                report("a.png", &[("Oxygen_Tank", 0.8)]),
                report("b.png", &[("Fire_Alarm", 0.6), ("Fire_Alarm", 0.4)]),
                report("c.png", &[]),
            ],
            vec!["missing.png".to_string()],
        );

        assert_eq!(summary.total_detections(), 3);
        assert!((summary.average_confidence() - 0.6).abs() < 1e-6);
        assert_eq!(summary.recommendation(), Recommendation::Moderate);
        assert_eq!(
            summary.class_distribution(),
            vec![("Fire_Alarm".to_string(), 2), ("Oxygen_Tank".to_string(), 1)]
        );

        let text = summary.to_string();
        assert!(text.contains("Images tested: 3"));
        assert!(text.contains("Images missing: 1"));
        assert!(text.contains("Fire Alarm: 2"));
        assert!(text.contains("missing.png: not found"));
    }

    #[test]
    fn test_summary_without_detections() {
        let summary = Summary::new(vec![report("a.png", &[])], Vec::new());

        assert_eq!(summary.recommendation(), Recommendation::NoDetections);
        assert!(summary.to_string().contains("No objects detected across all images"));
    }
}
