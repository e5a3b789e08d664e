mod common;

use common::*;
use mintcheck::detection::CenteringMeasurer;
use mintcheck::{BorderMeasurement, Grader, RectifiedImage};

fn face(offset: (i32, i32)) -> RectifiedImage {
    RectifiedImage::new(card_face(offset))
}

#[test]
fn test_centered_card_grades_high() {
    let result = Grader::default().grade_rectified(&face((0, 0)), None);

    assert!(result.centering >= 0.8, "centering {}", result.centering);
    assert!(result.grade >= 8.0, "grade {}", result.grade);
    // 10 px against 11 px on both axes
    assert!((result.centering - 10.0 / 11.0).abs() < 1e-9);
    assert_eq!(result.grade, 9.7);
}

#[test]
fn test_offset_cards_grade_lower() {
    let grader = Grader::default();
    for offset in [(5, 10), (-5, -10)] {
        let result = grader.grade_rectified(&face(offset), None);
        assert!(result.centering < 0.8, "{offset:?}: centering {}", result.centering);
    }
}

#[test]
fn test_centering_falls_as_offset_grows() {
    let grader = Grader::default();
    let scores: Vec<f64> = [(0, 0), (2, 2), (5, 10), (-5, -10)]
        .into_iter()
        .map(|offset| grader.grade_rectified(&face(offset), None).centering)
        .collect();

    for pair in scores.windows(2) {
        assert!(pair[0] > pair[1], "{scores:?}");
    }
}

#[test]
fn test_border_widths_follow_main_area() {
    let measurer = CenteringMeasurer::default();

    let shifted = measurer.measure(&face((5, 10)), None);
    assert_eq!(
        shifted.borders,
        Some(BorderMeasurement { top: 20, bottom: 1, left: 15, right: 6 })
    );
    assert!((shifted.score - (6.0 / 15.0 + 1.0 / 20.0) / 2.0).abs() < 1e-9);

    let slight = measurer.measure(&face((2, 2)), None);
    assert_eq!(
        slight.borders,
        Some(BorderMeasurement { top: 12, bottom: 9, left: 12, right: 9 })
    );
    assert!((slight.score - 0.75).abs() < 1e-9);
}

#[test]
fn test_print_flush_with_edge_scores_zero_on_that_axis() {
    let report = CenteringMeasurer::default().measure(&face((-5, -10)), None);
    let borders = report.borders.expect("borders");
    assert_eq!(borders.top, 0);
    assert_eq!(borders.vertical_ratio(), 0.0);
    assert_eq!(report.score, borders.horizontal_ratio() / 2.0);
}
