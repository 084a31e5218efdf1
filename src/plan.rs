//! The variant planner: expand a rule's formats × widths into work items.
//!
//! Planning is pure — no I/O, no pixels — so every decision the engine
//! makes about which variants exist is unit-testable here:
//!
//! - defaults: no formats means "the source format", no widths means `[1]`;
//! - optimize-only sources (SVG, GIF) collapse to at most one item per
//!   requested format equal to the source format, everything else pruned;
//! - widths `<= 1` are scale multipliers (`ceil(w × origin_width)`),
//!   widths `> 1` absolute pixel targets;
//! - scaling-up disabled prunes targets wider than the source;
//! - a target at least as wide as the source, in the source format, becomes
//!   a pass-through (bytes reused, no transcode);
//! - an unsupported format token becomes an [`WorkItem::Unsupported`] item
//!   so the failure surfaces when the output sequence reaches it, not at
//!   call time.
//!
//! When the origin width is unknown (unreadable metadata), comparisons
//! cannot be evaluated: items that would need them are pruned and nothing
//! is ever resized.

use crate::format::Format;

/// One planned variant: a concrete (format, width) unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedVariant {
    pub format: Format,
    /// Width parameter as declared in the rule.
    pub width_param: f64,
    /// Width handed to the postfix formatter.
    pub postfix_width: u32,
    /// Resize target for the transcoder; `None` means no resize.
    pub resize_to: Option<u32>,
    /// Scale multiplier to record on the derived asset.
    pub multiplier: Option<f64>,
    /// Reuse the source bytes unchanged instead of transcoding.
    pub passthrough: bool,
    /// Optimize-only path: no resize, no rename, no postfix.
    pub optimize_only: bool,
}

/// An entry in the planned work sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    Variant(PlannedVariant),
    /// A requested format outside the registry. Fails the generation when
    /// the sequence reaches this position.
    Unsupported(String),
}

/// Expand `formats` × `widths` into the ordered work sequence.
///
/// Formats iterate in declared order (outer), widths in declared order
/// (inner). Pruned combinations simply do not appear.
pub fn plan(
    formats: &[String],
    widths: &[f64],
    source_format: Format,
    origin_width: Option<u32>,
    scaling_up: bool,
) -> Vec<WorkItem> {
    let default_format = [source_format.extension().to_string()];
    let formats: &[String] = if formats.is_empty() { &default_format } else { formats };
    let widths: &[f64] = if widths.is_empty() { &[1.0] } else { widths };

    let mut items = Vec::new();

    for token in formats {
        let Some(format) = Format::from_token(token) else {
            items.push(WorkItem::Unsupported(token.clone()));
            continue;
        };

        if source_format.is_optimize_only() {
            // Never converted, never resized; the width axis collapses.
            if format == source_format {
                items.push(WorkItem::Variant(PlannedVariant {
                    format,
                    width_param: 1.0,
                    postfix_width: origin_width.unwrap_or(0),
                    resize_to: None,
                    multiplier: None,
                    passthrough: true,
                    optimize_only: true,
                }));
            }
            continue;
        }

        for &width in widths {
            if let Some(variant) = plan_width(format, width, source_format, origin_width, scaling_up)
            {
                items.push(WorkItem::Variant(variant));
            }
        }
    }

    items
}

fn plan_width(
    format: Format,
    width: f64,
    source_format: Format,
    origin_width: Option<u32>,
    scaling_up: bool,
) -> Option<PlannedVariant> {
    let is_multiplier = width <= 1.0;

    let target = match origin_width {
        Some(ow) if is_multiplier => Some(((width * ow as f64).ceil() as u32).max(1)),
        Some(_) => Some(width as u32),
        None => None,
    };

    if !scaling_up {
        match (target, origin_width) {
            (Some(t), Some(ow)) if t > ow => return None,
            // Unknown origin width: the comparison cannot be evaluated, so
            // absolute targets are pruned conservatively. Multipliers can
            // never scale up and stay.
            (None, None) if !is_multiplier => return None,
            _ => {}
        }
    }

    let will_resize = matches!((target, origin_width), (Some(t), Some(ow)) if t < ow);

    let postfix_width = match target {
        Some(t) => t,
        None => width.ceil().max(0.0) as u32,
    };

    Some(PlannedVariant {
        format,
        width_param: width,
        postfix_width,
        resize_to: if will_resize { target } else { None },
        multiplier: is_multiplier.then_some(width),
        passthrough: !will_resize && format == source_format,
        optimize_only: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn variants(items: &[WorkItem]) -> Vec<&PlannedVariant> {
        items
            .iter()
            .map(|i| match i {
                WorkItem::Variant(v) => v,
                WorkItem::Unsupported(t) => panic!("unexpected unsupported item {t}"),
            })
            .collect()
    }

    #[test]
    fn defaults_to_source_format_and_origin_scale() {
        let items = plan(&[], &[], Format::Jpg, Some(3120), true);
        let v = variants(&items);

        assert_eq!(v.len(), 1);
        assert_eq!(v[0].format, Format::Jpg);
        assert_eq!(v[0].width_param, 1.0);
        assert_eq!(v[0].resize_to, None);
        assert!(v[0].passthrough);
        assert_eq!(v[0].multiplier, Some(1.0));
    }

    #[test]
    fn multiplier_width_is_ceiling_of_fraction() {
        let items = plan(&tokens(&["jpg"]), &[0.33], Format::Jpg, Some(3120), true);
        let v = variants(&items);

        // ceil(0.33 * 3120) = ceil(1029.6) = 1030
        assert_eq!(v[0].resize_to, Some(1030));
        assert_eq!(v[0].postfix_width, 1030);
        assert_eq!(v[0].multiplier, Some(0.33));
    }

    #[test]
    fn absolute_width_has_no_multiplier() {
        let items = plan(&tokens(&["jpg"]), &[1280.0], Format::Jpg, Some(3120), true);
        let v = variants(&items);

        assert_eq!(v[0].resize_to, Some(1280));
        assert_eq!(v[0].multiplier, None);
        assert!(!v[0].passthrough);
    }

    #[test]
    fn cartesian_product_iterates_formats_outer_widths_inner() {
        let items = plan(
            &tokens(&["jpg", "webp", "png"]),
            &[0.33, 0.66, 1.0],
            Format::Jpg,
            Some(3000),
            true,
        );
        let v = variants(&items);

        assert_eq!(v.len(), 9);
        let order: Vec<(Format, f64)> = v.iter().map(|x| (x.format, x.width_param)).collect();
        assert_eq!(
            order,
            vec![
                (Format::Jpg, 0.33),
                (Format::Jpg, 0.66),
                (Format::Jpg, 1.0),
                (Format::Webp, 0.33),
                (Format::Webp, 0.66),
                (Format::Webp, 1.0),
                (Format::Png, 0.33),
                (Format::Png, 0.66),
                (Format::Png, 1.0),
            ]
        );
    }

    #[test]
    fn scaling_up_disabled_prunes_wider_targets() {
        let items = plan(
            &tokens(&["jpg"]),
            &[320.0, 5000.0],
            Format::Jpg,
            Some(3120),
            false,
        );
        let v = variants(&items);

        assert_eq!(v.len(), 1);
        assert_eq!(v[0].resize_to, Some(320));
    }

    #[test]
    fn scaling_up_enabled_keeps_wider_targets_without_resizing() {
        let items = plan(&tokens(&["webp"]), &[5000.0], Format::Jpg, Some(3120), true);
        let v = variants(&items);

        // Emitted, but the transcoder only ever shrinks: no resize happens.
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].resize_to, None);
        assert_eq!(v[0].postfix_width, 5000);
        assert!(!v[0].passthrough);
    }

    #[test]
    fn same_format_at_full_width_is_a_passthrough() {
        let items = plan(&tokens(&["jpg", "webp"]), &[1.0], Format::Jpg, Some(3120), true);
        let v = variants(&items);

        assert!(v[0].passthrough);
        assert!(!v[1].passthrough); // webp still needs a transcode
        assert_eq!(v[1].resize_to, None);
    }

    #[test]
    fn optimize_only_source_collapses_to_source_format() {
        let items = plan(
            &tokens(&["jpg", "webp", "gif"]),
            &[1.0, 1280.0, 320.0],
            Format::Gif,
            Some(500),
            true,
        );
        let v = variants(&items);

        assert_eq!(v.len(), 1);
        assert_eq!(v[0].format, Format::Gif);
        assert!(v[0].optimize_only);
        assert_eq!(v[0].resize_to, None);
    }

    #[test]
    fn vector_source_behaves_like_animated() {
        let items = plan(&tokens(&["png", "svg"]), &[0.5], Format::Svg, None, true);
        let v = variants(&items);

        assert_eq!(v.len(), 1);
        assert_eq!(v[0].format, Format::Svg);
        assert!(v[0].optimize_only);
    }

    #[test]
    fn unsupported_format_becomes_a_lazy_failure_item() {
        let items = plan(
            &tokens(&["jpg", "tiff", "png"]),
            &[1.0],
            Format::Jpg,
            Some(100),
            true,
        );

        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], WorkItem::Variant(_)));
        assert!(matches!(items[1], WorkItem::Unsupported(ref t) if t == "tiff"));
        assert!(matches!(items[2], WorkItem::Variant(_)));
    }

    #[test]
    fn unknown_origin_width_prunes_when_comparison_is_needed() {
        // scaling_up off + absolute width: cannot compare, prune.
        let items = plan(&tokens(&["jpg"]), &[1280.0], Format::Jpg, None, false);
        assert!(variants(&items).is_empty());

        // Multipliers never scale up, so they survive — but nothing resizes.
        let items = plan(&tokens(&["webp"]), &[0.5], Format::Jpg, None, false);
        let v = variants(&items);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].resize_to, None);
    }

    #[test]
    fn zero_multiplier_clamps_to_one_pixel() {
        let items = plan(&tokens(&["jpg"]), &[0.0], Format::Jpg, Some(3120), true);
        let v = variants(&items);
        assert_eq!(v[0].resize_to, Some(1));
    }

    #[test]
    fn concrete_scenario_three_widths() {
        // 3120×4160 source, widths [1, 1280, 320].
        let items = plan(
            &[],
            &[1.0, 1280.0, 320.0],
            Format::Jpg,
            Some(3120),
            true,
        );
        let v = variants(&items);

        assert_eq!(v.len(), 3);
        assert_eq!(v[0].resize_to, None);
        assert!(v[0].passthrough);
        assert_eq!(v[1].resize_to, Some(1280));
        assert_eq!(v[2].resize_to, Some(320));
    }
}
