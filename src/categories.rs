//! Keyword-cascade classification of markets into two-level category labels.
//!
//! The cascade is a data-driven, ordered rule table: a rule matches when
//! every keyword group has at least one hit in the lowercased title+ticker
//! text and no exclude keyword appears. First match wins, which encodes the
//! precedence (most specific rules first). Fallback is `Misc`.

pub struct CategoryRule {
    /// Every group must have at least one contained keyword.
    pub requires: &'static [&'static [&'static str]],
    pub excludes: &'static [&'static str],
    pub label: &'static str,
}

macro_rules! rule {
    ([$([$($kw:literal),+ $(,)?]),+ $(,)?] => $label:literal) => {
        CategoryRule { requires: &[$(&[$($kw),+]),+], excludes: &[], label: $label }
    };
    ([$([$($kw:literal),+ $(,)?]),+ $(,)?] except [$($ex:literal),+ $(,)?] => $label:literal) => {
        CategoryRule { requires: &[$(&[$($kw),+]),+], excludes: &[$($ex),+], label: $label }
    };
}

pub const FALLBACK_CATEGORY: &str = "Misc";

static RULES: &[CategoryRule] = &[
    // Elections, federal first: most specific rules at the top.
    rule!([["senate"], ["primary", "nominee", "nomination"]] => "Elections - Senate Primaries"),
    rule!([["senate"]] => "Elections - Senate"),
    rule!([["house", "congress"], ["seat", "race", "win", "democratic", "republican"], ["primary"]]
        => "Elections - House Primaries"),
    rule!([["house", "congress"], ["seat", "race", "win", "democratic", "republican"]]
        => "Elections - House"),
    rule!([["president"], ["election", "nominee", "nomination"]] => "Elections - President"),
    rule!([["governor"], ["primary", "nominee"]] => "Elections - Governor Primaries"),
    rule!([["governor"]] => "Elections - Governor"),
    rule!([["attorney general"]] => "Elections - Attorney General"),
    rule!([["attorney"], ["race"]] => "Elections - Attorney General"),
    // Appointments and confirmations.
    rule!([["confirm"], ["supreme court", "justice", "scotus"]] => "Appointments - Supreme Court"),
    rule!([["confirm"], ["cabinet", "secretary"]] except ["state department"]
        => "Appointments - Cabinet"),
    rule!([["confirm"], ["attorney"]] => "Appointments - Attorneys"),
    rule!([["confirm"], ["judge", "judicial"]] => "Appointments - Judiciary"),
    rule!([["confirm"]] => "Appointments - Other"),
    rule!([["appoint"], ["supreme court", "justice"]] except ["disappoint"]
        => "Appointments - Supreme Court"),
    rule!([["appoint"], ["cabinet", "secretary"]] except ["disappoint"] => "Appointments - Cabinet"),
    rule!([["appoint"]] except ["disappoint"] => "Appointments - Other"),
    rule!([["supreme court", "scotus"]] => "Appointments - Supreme Court"),
    rule!([["cabinet", "secretary"]] except ["state department"] => "Appointments - Cabinet"),
    // White House and the executive.
    rule!([["visit"], ["white house", "whvisit"]] => "White House - Visits"),
    rule!([["mar-a-lago"]] => "White House - Visits"),
    rule!([["trump"], ["endorse"]] => "Elections - Endorsements"),
    rule!([["presidential"]] except ["election"] => "Executive - Presidential"),
    // Legislation.
    rule!([["bill"], ["pass", "become law", "law"]] => "Legislation - Bills & Laws"),
    rule!([["legislation"]] => "Legislation - Bills & Laws"),
    rule!([["law"], ["become"]] => "Legislation - Bills & Laws"),
    rule!([["congress"], ["pass", "vote", "resolution"]] => "Legislation - Congressional Votes"),
    rule!([["resolution"], ["pass"]] => "Legislation - Congressional Votes"),
    // International.
    rule!([["prime minister", "parliament"]] => "International - Foreign Leaders"),
    rule!([["head of state"]] => "International - Foreign Leaders"),
    rule!([["government"], ["venezuela", "czech", "mexico", "netherlands", "hungary", "armenia"]]
        => "International - Foreign Leaders"),
    rule!([["nato", "alliance"]] => "International - Alliances"),
    rule!([["taiwan", "china", "russia", "ukraine", "israel", "iran", "venezuela", "czech",
            "mexico", "netherlands", "hungary", "armenia", "norway", "philippines", "chile",
            "paraguay", "france", "lyon"]] => "International - Foreign Policy"),
    rule!([["visit"], ["country", "nation", "foreign"]] => "International - Visits"),
    // Local elections.
    rule!([["mayor"]] => "Elections - Local"),
    rule!([["primary"], ["wa-", "ca-", "tx-", "ny-", "fl-", "il-", "mi-", "nc-", "md-", "az-", "ga-"]]
        => "Elections - House Primaries"),
    // Economics.
    rule!([["gdp", "inflation", "unemployment", "recession", "economic"]]
        => "Economics - Indicators"),
    rule!([["fed", "federal reserve", "jerome powell"]] => "Economics - Federal Reserve"),
    rule!([["budget", "spending", "debt ceiling"]] => "Economics - Budget"),
    // Polls.
    rule!([["approval"], ["rating", "below", "above"]] => "Polls - Approval Ratings"),
    rule!([["poll"]] except ["polling place"] => "Polls - Other"),
    // Legal.
    rule!([["arrest", "charge", "indict"]] => "Legal - Arrests & Charges"),
    rule!([["impeach"]] => "Legal - Impeachment"),
    rule!([["contempt"]] => "Legal - Contempt"),
    // Remaining election shapes.
    rule!([["primary"], ["nominee", "win", "who will"]] => "Elections - Primaries"),
    rule!([["nominee"], ["democratic", "republican"]] => "Elections - Nominations"),
    rule!([["election"], ["foreign", "international"]] => "International - Foreign Leaders"),
    // Policy and regulation.
    rule!([["policy", "regulation", "regulate"]] => "Policy - Regulations"),
    rule!([["executive order"]] => "Executive - Orders"),
    rule!([["order"], ["come into effect"]] => "Executive - Orders"),
    rule!([["birthright", "executive action"]] => "Executive - Orders"),
    rule!([["tariff", "trade war", "trade agreement"]] => "Economics - Trade"),
    rule!([["immigration", "border", "deport"]] => "Policy - Immigration"),
    rule!([["healthcare", "health care", "medicare", "medicaid"]] => "Policy - Healthcare"),
    rule!([["climate", "carbon", "emission"]] => "Policy - Climate"),
    rule!([["privacy", "data protection", "tech regulation"]] => "Policy - Technology"),
    rule!([["capital control"]] => "Economics - Policy"),
    rule!([["medal of freedom", "presidential medal"]] => "Executive - Awards"),
];

/// Maps a market's title and ticker to a `Parent - Sub` label.
pub fn categorize_market(title: &str, ticker: &str) -> &'static str {
    let combined = format!("{} {}", title.to_lowercase(), ticker.to_lowercase());

    for rule in RULES {
        let required = rule
            .requires
            .iter()
            .all(|group| group.iter().any(|kw| combined.contains(kw)));
        let excluded = rule.excludes.iter().any(|kw| combined.contains(kw));
        if required && !excluded {
            return rule.label;
        }
    }

    FALLBACK_CATEGORY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let a = categorize_market("Will the Senate race in Ohio flip?", "KXSEN-OH");
        let b = categorize_market("Will the Senate race in Ohio flip?", "KXSEN-OH");
        assert_eq!(a, b);
    }

    #[test]
    fn senate_primary_beats_plain_senate() {
        assert_eq!(
            categorize_market("Who wins the Senate primary in Texas?", "KX1"),
            "Elections - Senate Primaries"
        );
        assert_eq!(
            categorize_market("Senate race winner", "KX2"),
            "Elections - Senate"
        );
    }

    #[test]
    fn confirmations_route_by_target() {
        assert_eq!(
            categorize_market("Will the justice be confirmed to the Supreme Court?", "KXSCOTUS"),
            "Appointments - Supreme Court"
        );
        assert_eq!(
            categorize_market("Will the judge be confirmed?", "KXJ"),
            "Appointments - Judiciary"
        );
    }

    #[test]
    fn disappointment_is_not_an_appointment() {
        assert_eq!(
            categorize_market("Will fans be disappointed?", "KXX"),
            "Misc"
        );
    }

    #[test]
    fn economics_keywords() {
        assert_eq!(
            categorize_market("US recession declared this year?", "KXREC"),
            "Economics - Indicators"
        );
        assert_eq!(
            categorize_market("Will Jerome Powell cut rates?", "KXFED"),
            "Economics - Federal Reserve"
        );
    }

    #[test]
    fn foreign_policy_by_country() {
        assert_eq!(
            categorize_market("Will Russia and Ukraine sign a ceasefire?", "KXUA"),
            "International - Foreign Policy"
        );
    }

    #[test]
    fn unmatched_titles_fall_back_to_misc() {
        assert_eq!(categorize_market("Completely unrelated event", "KXZZ"), "Misc");
    }

    #[test]
    fn ticker_text_participates_in_matching() {
        assert_eq!(
            categorize_market("Margin of victory", "KXWHVISIT-GERMANY visit"),
            "White House - Visits"
        );
    }
}
