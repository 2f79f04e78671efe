use crate::cognition::perception::PatternMatcher;
use crate::types::{Extraction, Intent, MissingSlot};

const MIN_PRODUCT_QUERY_WORDS: usize = 3;

/// Slots a loose trigger implies but the utterance lacks.
///
/// Pure: the same utterance always yields the same set, in slot order.
pub fn detect(matcher: &PatternMatcher, text: &str, extraction: &Extraction) -> Vec<MissingSlot> {
    let mut missing = Vec::new();

    if extraction.has_intent(Intent::CalcRequest) && !matcher.has_complete_expression(text) {
        missing.push(MissingSlot::IncompleteExpression);
    }

    if extraction.has_intent(Intent::ProductQuery)
        && text.split_whitespace().count() < MIN_PRODUCT_QUERY_WORDS
        && extraction.products().next().is_none()
    {
        missing.push(MissingSlot::NoSpecificProduct);
    }

    if extraction.has_intent(Intent::OutletQuery)
        && !extraction.names_location()
        && !extraction.has_outlet_detail()
        && matcher.unknown_place(text).is_none()
    {
        missing.push(MissingSlot::NoLocationOrQuery);
    }

    missing
}
