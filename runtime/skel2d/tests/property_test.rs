//! Property tests for angle wrapping and keyframe curve sampling.

use proptest::prelude::*;
use skel2d::animation::Curve;
use skel2d::math::wrap_deg;

proptest! {
    #[test]
    fn wrap_deg_lands_in_half_open_range(angle in -100_000.0f32..100_000.0) {
        let wrapped = wrap_deg(angle);
        prop_assert!(wrapped > -180.01 && wrapped <= 180.01, "wrapped = {wrapped}");
    }

    #[test]
    fn wrap_deg_preserves_angle_modulo_360(angle in -10_000.0f32..10_000.0) {
        let wrapped = wrap_deg(angle);
        let turns = (angle - wrapped) / 360.0;
        prop_assert!((turns - turns.round()).abs() < 1e-3);
    }

    #[test]
    fn bezier_fixes_endpoints(
        cx1 in 0.0f32..1.0,
        cy1 in 0.0f32..1.0,
        cx2 in 0.0f32..1.0,
        cy2 in 0.0f32..1.0,
    ) {
        let curve = Curve::bezier(cx1, cy1, cx2, cy2);
        prop_assert!(curve.percent(0.0).abs() < 0.05);
        prop_assert!((curve.percent(1.0) - 1.0).abs() < 0.05);
    }

    #[test]
    fn bezier_output_stays_bounded(t in 0.0f32..1.0) {
        let curve = Curve::bezier(0.25, 0.1, 0.75, 0.9);
        let percent = curve.percent(t);
        prop_assert!((-0.01..=1.01).contains(&percent));
    }

    #[test]
    fn linear_curve_is_identity(t in 0.0f32..1.0) {
        prop_assert!((Curve::Linear.percent(t) - t).abs() < 1e-6);
    }
}
