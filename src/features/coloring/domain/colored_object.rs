//! ColoredObject and the two merge operations over it (§4.3).

use ahash::AHashMap;

use super::color::{Confidence, PaintedColor, TraceItem};

/// A node's coloring: per observed runtime class, the dominant
/// `PaintedColor`, plus a recursive map from field name to that field's
/// own `ColoredObject` (§4.3). The "observed classes" set is normally a
/// singleton (this crate has no heap-aware subtype refinement beyond
/// what a rule or a `CHECKCAST` narrows it to), but the map shape itself
/// supports more than one, matching the source model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColoredObject {
    pub by_class: AHashMap<String, PaintedColor>,
    pub fields: AHashMap<String, ColoredObject>,
}

impl ColoredObject {
    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty() && self.fields.is_empty()
    }

    pub fn single(class: impl Into<String>, color: PaintedColor) -> Self {
        let mut by_class = AHashMap::default();
        by_class.insert(class.into(), color);
        ColoredObject { by_class, fields: AHashMap::default() }
    }

    pub fn observed_classes(&self) -> impl Iterator<Item = &String> {
        self.by_class.keys()
    }

    /// Record `color` at `field_path` (possibly nested, e.g. `["next",
    /// "value"]`), creating intermediate `ColoredObject`s as needed. Used
    /// by `ParentAttributesDefinerBrush` (§4.4).
    pub fn set_field(&mut self, field_path: &[String], class: impl Into<String>, color: PaintedColor) {
        match field_path.split_first() {
            None => {
                self.by_class.insert(class.into(), color);
            }
            Some((head, rest)) => {
                self.fields.entry(head.clone()).or_default().set_field(rest, class, color);
            }
        }
    }
}

/// An emitted source/sink collision (§4.3 `merge_most_dangerous`).
#[derive(Debug, Clone)]
pub struct Intersection {
    pub source_trace: TraceItem,
    pub sink_trace: TraceItem,
}

/// Per (class, field-path) key: pick the higher-confidence color; on a
/// tie, union the two, keeping both traces when the tags agree. Tags
/// disagreeing at equal confidence is not itself an error here — that
/// collision is `merge_most_dangerous`'s job; `merge_lub` alone keeps
/// `a`'s tag, matching "take the union" read as "don't lose either
/// side's trace" rather than as tag arithmetic.
pub fn merge_lub(a: &ColoredObject, b: &ColoredObject) -> ColoredObject {
    merge_with(a, b, &mut |pa, pb| merge_painted_lub(pa, pb))
}

fn merge_painted_lub(pa: &PaintedColor, pb: &PaintedColor) -> PaintedColor {
    if pa.confidence > pb.confidence {
        pa.clone()
    } else if pb.confidence > pa.confidence {
        pb.clone()
    } else if pa.color == pb.color {
        if pa.trace == pb.trace {
            pa.clone()
        } else {
            PaintedColor::new(pa.color.clone(), pa.confidence, pa.trace.chain(pb.trace.describe().to_string()))
        }
    } else {
        pa.clone()
    }
}

/// Per (class, field-path): if both sides agree on source-like or
/// sink-like, defer to `merge_lub`; if they disagree, emit an
/// `Intersection` via `on_intersection` and keep whichever side is more
/// explicitly declared (a tie keeps `a`).
pub fn merge_most_dangerous(
    a: &ColoredObject,
    b: &ColoredObject,
    on_intersection: &mut dyn FnMut(Intersection),
) -> ColoredObject {
    merge_with(a, b, &mut |pa, pb| {
        let collides = (pa.color.is_source_like() && pb.color.is_sink_like())
            || (pa.color.is_sink_like() && pb.color.is_source_like());
        if !collides {
            return merge_painted_lub(pa, pb);
        }
        let (source, sink) = if pa.color.is_source_like() { (pa, pb) } else { (pb, pa) };
        on_intersection(Intersection { source_trace: source.trace.clone(), sink_trace: sink.trace.clone() });
        if pa.confidence >= pb.confidence {
            pa.clone()
        } else {
            pb.clone()
        }
    })
}

fn merge_with(
    a: &ColoredObject,
    b: &ColoredObject,
    combine: &mut dyn FnMut(&PaintedColor, &PaintedColor) -> PaintedColor,
) -> ColoredObject {
    let mut by_class = AHashMap::default();
    for key in a.by_class.keys().chain(b.by_class.keys()) {
        if by_class.contains_key(key) {
            continue;
        }
        let merged = match (a.by_class.get(key), b.by_class.get(key)) {
            (Some(pa), Some(pb)) => combine(pa, pb),
            (Some(pa), None) => pa.clone(),
            (None, Some(pb)) => pb.clone(),
            (None, None) => unreachable!(),
        };
        by_class.insert(key.clone(), merged);
    }

    let mut fields = AHashMap::default();
    for key in a.fields.keys().chain(b.fields.keys()) {
        if fields.contains_key(key) {
            continue;
        }
        let merged = match (a.fields.get(key), b.fields.get(key)) {
            (Some(fa), Some(fb)) => merge_with(fa, fb, combine),
            (Some(fa), None) => fa.clone(),
            (None, Some(fb)) => fb.clone(),
            (None, None) => unreachable!(),
        };
        fields.insert(key.clone(), merged);
    }

    ColoredObject { by_class, fields }
}

/// Iterate over every combination of "single class per input", one class
/// drawn from each input's observed-class set, invoking `callback` with
/// the combination (§4.3). An input with no observed classes yields no
/// combinations at all (there's nothing to refine against).
pub fn demultiplex(inputs: &[ColoredObject], mut callback: impl FnMut(&[String])) {
    let class_sets: Vec<Vec<String>> = inputs.iter().map(|c| c.observed_classes().cloned().collect()).collect();
    if class_sets.iter().any(Vec::is_empty) {
        return;
    }
    let mut current = Vec::with_capacity(class_sets.len());
    demultiplex_rec(&class_sets, 0, &mut current, &mut callback);
}

fn demultiplex_rec(sets: &[Vec<String>], index: usize, current: &mut Vec<String>, callback: &mut dyn FnMut(&[String])) {
    if index == sets.len() {
        callback(current);
        return;
    }
    for class in &sets[index] {
        current.push(class.clone());
        demultiplex_rec(sets, index + 1, current, callback);
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit(color: crate::features::coloring::domain::ColorTag, trace: &str) -> PaintedColor {
        PaintedColor::new(color, Confidence::Explicitly, TraceItem::root(trace))
    }

    fn inferred(color: crate::features::coloring::domain::ColorTag, trace: &str) -> PaintedColor {
        PaintedColor::new(color, Confidence::Inferred, TraceItem::root(trace))
    }

    #[test]
    fn merge_lub_prefers_higher_confidence() {
        use crate::features::coloring::domain::ColorTag;
        let a = ColoredObject::single("java/lang/String", explicit(ColorTag::SourceData, "rule"));
        let b = ColoredObject::single("java/lang/String", inferred(ColorTag::SinkTarget, "inferred"));
        let merged = merge_lub(&a, &b);
        assert_eq!(merged.by_class["java/lang/String"].confidence, Confidence::Explicitly);
        assert_eq!(merged.by_class["java/lang/String"].color, ColorTag::SourceData);
    }

    #[test]
    fn merge_lub_disjoint_classes_union() {
        use crate::features::coloring::domain::ColorTag;
        let a = ColoredObject::single("A", explicit(ColorTag::SourceData, "a"));
        let b = ColoredObject::single("B", explicit(ColorTag::SinkTarget, "b"));
        let merged = merge_lub(&a, &b);
        assert_eq!(merged.by_class.len(), 2);
    }

    #[test]
    fn merge_most_dangerous_emits_intersection_on_collision() {
        use crate::features::coloring::domain::ColorTag;
        let a = ColoredObject::single("java/lang/String", explicit(ColorTag::SourceData, "source"));
        let b = ColoredObject::single("java/lang/String", explicit(ColorTag::SinkTarget, "sink"));
        let mut hits = Vec::new();
        let merged = merge_most_dangerous(&a, &b, &mut |i| hits.push(i));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_trace.to_string(), "source");
        assert_eq!(hits[0].sink_trace.to_string(), "sink");
        assert_eq!(merged.by_class.len(), 1);
    }

    #[test]
    fn merge_most_dangerous_without_collision_behaves_like_lub() {
        use crate::features::coloring::domain::ColorTag;
        let a = ColoredObject::single("java/lang/String", explicit(ColorTag::SourceData, "a"));
        let b = ColoredObject::single("java/lang/String", inferred(ColorTag::SourceData, "b"));
        let mut hits = Vec::new();
        let merged = merge_most_dangerous(&a, &b, &mut |i| hits.push(i));
        assert!(hits.is_empty());
        assert_eq!(merged.by_class["java/lang/String"].confidence, Confidence::Explicitly);
    }

    #[test]
    fn demultiplex_enumerates_cartesian_product() {
        let a = ColoredObject::single("A1", explicit(crate::features::coloring::domain::ColorTag::SourceData, "a1"));
        let mut b = ColoredObject::default();
        b.by_class.insert("B1".into(), explicit(crate::features::coloring::domain::ColorTag::SourceData, "b1"));
        b.by_class.insert("B2".into(), explicit(crate::features::coloring::domain::ColorTag::SourceData, "b2"));
        let mut combos = Vec::new();
        demultiplex(&[a, b], |combo| combos.push(combo.to_vec()));
        combos.sort();
        assert_eq!(combos, vec![vec!["A1".to_string(), "B1".to_string()], vec!["A1".to_string(), "B2".to_string()]]);
    }

    #[test]
    fn demultiplex_empty_input_yields_nothing() {
        let mut calls = 0;
        demultiplex(&[ColoredObject::default()], |_| calls += 1);
        assert_eq!(calls, 0);
    }

    use proptest::prelude::*;

    fn arb_confidence() -> impl Strategy<Value = Confidence> {
        prop_oneof![Just(Confidence::Inferred), Just(Confidence::Explicitly)]
    }

    fn arb_color() -> impl Strategy<Value = crate::features::coloring::domain::ColorTag> {
        use crate::features::coloring::domain::ColorTag;
        prop_oneof![
            Just(ColorTag::SourceData),
            Just(ColorTag::SinkTarget),
            "[a-z]{1,6}".prop_map(ColorTag::Custom),
        ]
    }

    proptest! {
        /// §8 monotonicity: merging never drops a class key present in
        /// either input, and the winning confidence is never lower than
        /// the higher of the two inputs'.
        #[test]
        fn merge_lub_is_monotone_in_confidence(
            conf_a in arb_confidence(), color_a in arb_color(),
            conf_b in arb_confidence(), color_b in arb_color(),
        ) {
            let a = ColoredObject::single("K", PaintedColor::new(color_a.clone(), conf_a, TraceItem::root("a")));
            let b = ColoredObject::single("K", PaintedColor::new(color_b.clone(), conf_b, TraceItem::root("b")));
            let merged = merge_lub(&a, &b);

            prop_assert!(merged.by_class.contains_key("K"));
            let winner = &merged.by_class["K"];
            prop_assert!(winner.confidence >= conf_a.max(conf_b));
            if conf_a > conf_b {
                prop_assert_eq!(&winner.color, &color_a);
            } else if conf_b > conf_a {
                prop_assert_eq!(&winner.color, &color_b);
            }
        }

        /// Merging is a genuine no-op on an object merged with itself: the
        /// whole `ColoredObject` comes back structurally equal, not just
        /// matching on color/confidence — a brush re-merging a stable
        /// input must see `changed == false`, which needs `PartialEq` to
        /// agree, trace included.
        #[test]
        fn merge_lub_is_idempotent(conf in arb_confidence(), color in arb_color()) {
            let a = ColoredObject::single("K", PaintedColor::new(color, conf, TraceItem::root("a")));
            let merged = merge_lub(&a, &a);
            prop_assert_eq!(merged, a);
        }
    }
}
