//! URL builders for the back-office endpoints
//!
//! Five pages hang off every sale `nr`, plus two detail-modal endpoints
//! parameterized by secondary ids discovered during payment extraction.

/// The five page types fetched per record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    View,
    Logistic,
    Payment,
    Infos,
    Orders,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::View => "view",
            PageType::Logistic => "logistic",
            PageType::Payment => "payment",
            PageType::Infos => "infos",
            PageType::Orders => "orders",
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// All five URLs for a given nr, main view first.
pub fn page_urls(base_url: &str, nr: u32) -> Vec<String> {
    let base = base(base_url);
    vec![
        format!("{base}/digi/com/cto/view?nr={nr}"),
        format!("{base}/digi/com/cto/viewLogistic?nr={nr}"),
        format!("{base}/digi/com/cto/viewPayment?nr={nr}"),
        format!("{base}/digi/com/cto/viewInfos?nr={nr}"),
        format!("{base}/digi/com/cto/viewOrders?nr={nr}"),
    ]
}

/// The main view URL for a given nr.
pub fn view_url(base_url: &str, nr: u32) -> String {
    format!("{}/digi/com/cto/view?nr={nr}", base(base_url))
}

/// Detail modal for one payment request, keyed by the request's own nr.
pub fn payment_request_details_url(base_url: &str, request_nr: u64) -> String {
    format!(
        "{}/digi/com/gocardless/viewPaymentRequestInfos?spaceSelect=1&nr={request_nr}",
        base(base_url)
    )
}

/// Detail modal for one transaction, keyed by the transaction's own nr.
pub fn transaction_details_url(base_url: &str, transaction_nr: u64) -> String {
    format!(
        "{}/digi/cfg/modal/ajax/viewTransaction?nr={transaction_nr}",
        base(base_url)
    )
}

/// Known protected resource used by the session validation probe.
pub fn probe_url(base_url: &str) -> String {
    view_url(base_url, 1)
}

/// Classifies a URL into its page type. Unknown paths fall back to View,
/// which matches the main page's unmarked URL.
pub fn page_type_of(url: &str) -> PageType {
    if url.contains("viewLogistic") {
        PageType::Logistic
    } else if url.contains("viewPayment") {
        PageType::Payment
    } else if url.contains("viewInfos") {
        PageType::Infos
    } else if url.contains("viewOrders") {
        PageType::Orders
    } else {
        PageType::View
    }
}

/// Whether a URL is one of the detail-modal endpoints rather than one of
/// the five main pages.
pub fn is_detail_modal(url: &str) -> bool {
    url.contains("/gocardless/viewPaymentRequestInfos") || url.contains("/modal/ajax/viewTransaction")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_urls_count_and_order() {
        let urls = page_urls("https://bo.example.com", 52002);
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[0], "https://bo.example.com/digi/com/cto/view?nr=52002");
        assert!(urls[2].contains("viewPayment"));
    }

    #[test]
    fn test_trailing_slash_tolerated() {
        assert_eq!(
            view_url("https://bo.example.com/", 7),
            "https://bo.example.com/digi/com/cto/view?nr=7"
        );
    }

    #[test]
    fn test_page_type_of() {
        assert_eq!(page_type_of("https://x/digi/com/cto/view?nr=1"), PageType::View);
        assert_eq!(
            page_type_of("https://x/digi/com/cto/viewLogistic?nr=1"),
            PageType::Logistic
        );
        assert_eq!(
            page_type_of("https://x/digi/com/cto/viewOrders?nr=1"),
            PageType::Orders
        );
    }

    #[test]
    fn test_detail_modal_classification() {
        assert!(is_detail_modal(&payment_request_details_url("https://x", 9)));
        assert!(is_detail_modal(&transaction_details_url("https://x", 9)));
        assert!(!is_detail_modal(&view_url("https://x", 9)));
    }
}
