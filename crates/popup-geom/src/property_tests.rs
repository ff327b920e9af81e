use proptest::prelude::*;

use crate::{
    Placement, PlacementSpec, Rect, Size, build_placement, compute_position, constrain_size,
    parse_placement,
};

fn placement_strategy() -> impl Strategy<Value = Placement> {
    (0usize..12).prop_map(|i| Placement::all().nth(i).unwrap_or_default())
}

fn size_strategy() -> impl Strategy<Value = Size> {
    (1.0f64..3000.0, 1.0f64..3000.0).prop_map(|(w, h)| Size::new(w, h))
}

proptest! {
    #[test]
    fn placement_tokens_round_trip(p in placement_strategy()) {
        let token = build_placement(p);
        prop_assert_eq!(parse_placement(&token), Ok(p));
        prop_assert_eq!(build_placement(parse_placement(&token).unwrap()), token);
    }
}

proptest! {
    #[test]
    fn constrain_never_grows(
        size in size_strategy(),
        max in size_strategy(),
        pad in 0.0f64..64.0,
    ) {
        let out = constrain_size(size, max, pad);
        prop_assert!(out.width <= size.width);
        prop_assert!(out.height <= size.height);
        prop_assert!(out.width >= 0.0 && out.height >= 0.0);
        if size.width <= max.width - 2.0 * pad {
            prop_assert_eq!(out.width, size.width);
        }
        if size.height <= max.height - 2.0 * pad {
            prop_assert_eq!(out.height, size.height);
        }
    }
}

proptest! {
    #[test]
    fn shifted_popup_stays_on_cross_axis(
        ax in 0.0f64..1000.0,
        ay in 0.0f64..700.0,
        aw in 1.0f64..200.0,
        ah in 1.0f64..200.0,
        w in 10.0f64..400.0,
        h in 10.0f64..300.0,
        p in placement_strategy(),
    ) {
        let viewport = Size::new(1024.0, 768.0);
        let pad = 8.0;
        let spec = PlacementSpec {
            placement: p,
            viewport_padding: pad,
            ..PlacementSpec::default()
        };
        let r = compute_position(&Rect::new(ax, ay, aw, ah), Size::new(w, h), &spec, viewport);
        prop_assert_eq!(r.flipped, r.placement.side != p.side);
        prop_assert_eq!(r.placement.alignment, p.alignment);
        // Popups smaller than the padded viewport end up inside it on the
        // cross axis (allowing for pixel rounding).
        if r.placement.side.axis() == crate::Axis::Vertical {
            prop_assert!(f64::from(r.x) >= pad - 0.5);
            prop_assert!(f64::from(r.x) + w <= viewport.width - pad + 0.5);
        } else {
            prop_assert!(f64::from(r.y) >= pad - 0.5);
            prop_assert!(f64::from(r.y) + h <= viewport.height - pad + 0.5);
        }
    }
}
