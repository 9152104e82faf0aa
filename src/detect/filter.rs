use super::result::Prediction;

/// Keep predictions whose probability is at least `threshold`.
///
/// The comparison is inclusive and uses the threshold exactly as given.
/// Backend order is preserved.
pub fn filter_predictions(predictions: Vec<Prediction>, threshold: f64) -> Vec<Prediction> {
    predictions
        .into_iter()
        .filter(|prediction| prediction.probability >= threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn prediction(tag: &str, probability: f64) -> Prediction {
        Prediction {
            probability,
            bounding_box: BoundingBox {
                left: 0.0,
                top: 0.0,
                width: 0.5,
                height: 0.5,
            },
            tag_name: tag.to_string(),
            tag_id: None,
        }
    }

    #[test]
    fn boundary_value_is_accepted() {
        let kept = filter_predictions(vec![prediction("knife", 0.5)], 0.5);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn keeps_exactly_the_predictions_at_or_above_threshold() {
        let probabilities = [0.0, 0.1, 0.25, 0.4999, 0.5, 0.5001, 0.75, 0.9, 1.0];
        for &threshold in &[0.0, 0.25, 0.5, 0.75, 1.0] {
            let input: Vec<Prediction> = probabilities
                .iter()
                .map(|&p| prediction("tag", p))
                .collect();
            let kept = filter_predictions(input, threshold);
            let expected: Vec<f64> = probabilities
                .iter()
                .copied()
                .filter(|&p| p >= threshold)
                .collect();
            let actual: Vec<f64> = kept.iter().map(|p| p.probability).collect();
            assert_eq!(actual, expected, "threshold {}", threshold);
        }
    }

    #[test]
    fn preserves_backend_order() {
        let kept = filter_predictions(
            vec![
                prediction("scissors", 0.9),
                prediction("noise", 0.2),
                prediction("knife", 0.6),
                prediction("blade", 0.95),
            ],
            0.5,
        );
        let tags: Vec<&str> = kept.iter().map(|p| p.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["scissors", "knife", "blade"]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(filter_predictions(Vec::new(), 0.5).is_empty());
    }
}
