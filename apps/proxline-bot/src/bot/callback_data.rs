//! Inline-keyboard callback payloads as a closed union.
//!
//! Every button the bot renders encodes one of these variants; the callback
//! handler parses the payload back and matches exhaustively, so there is no
//! ad-hoc string inspection at dispatch time.

use crate::bot::dialogue::ProxyType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuTarget {
    Socks5,
    Pptp,
    Account,
    ProxyTools,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    ByState,
    ByCity,
    ByZip,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountAction {
    Deposit,
    LinkAccount,
    LinkedUsers,
    AddLinkedUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyToolAction {
    Validate(ProxyType),
    Extend(ProxyType),
    ValidateAllPptp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackData {
    MainMenu,
    Menu(MenuTarget),
    Country(String),
    Catalog(i64),
    Filter(FilterKind),
    StatePick(String),
    ShowMore,
    Buy(i64),
    BuyByFilter,
    ConfirmPurchase,
    CancelPurchase,
    BackToFilter,
    Account(AccountAction),
    RemoveLinked(i64),
    HistoryPage(i64),
    ProxyTool(ProxyToolAction),
}

fn proxy_type_tag(pt: ProxyType) -> &'static str {
    pt.as_str()
}

fn parse_proxy_type(tag: &str) -> Option<ProxyType> {
    match tag {
        "socks5" => Some(ProxyType::Socks5),
        "pptp" => Some(ProxyType::Pptp),
        _ => None,
    }
}

impl CallbackData {
    pub fn encode(&self) -> String {
        match self {
            CallbackData::MainMenu => "main".into(),
            CallbackData::Menu(MenuTarget::Socks5) => "menu:socks5".into(),
            CallbackData::Menu(MenuTarget::Pptp) => "menu:pptp".into(),
            CallbackData::Menu(MenuTarget::Account) => "menu:account".into(),
            CallbackData::Menu(MenuTarget::ProxyTools) => "menu:tools".into(),
            CallbackData::Menu(MenuTarget::History) => "menu:history".into(),
            CallbackData::Country(code) => format!("country:{}", code),
            CallbackData::Catalog(id) => format!("catalog:{}", id),
            CallbackData::Filter(FilterKind::ByState) => "flt:state".into(),
            CallbackData::Filter(FilterKind::ByCity) => "flt:city".into(),
            CallbackData::Filter(FilterKind::ByZip) => "flt:zip".into(),
            CallbackData::Filter(FilterKind::All) => "flt:all".into(),
            CallbackData::StatePick(state) => format!("st:{}", state),
            CallbackData::ShowMore => "more".into(),
            CallbackData::Buy(id) => format!("buy:{}", id),
            CallbackData::BuyByFilter => "buyflt".into(),
            CallbackData::ConfirmPurchase => "confirm".into(),
            CallbackData::CancelPurchase => "cancelbuy".into(),
            CallbackData::BackToFilter => "backflt".into(),
            CallbackData::Account(AccountAction::Deposit) => "acct:deposit".into(),
            CallbackData::Account(AccountAction::LinkAccount) => "acct:link".into(),
            CallbackData::Account(AccountAction::LinkedUsers) => "acct:linked".into(),
            CallbackData::Account(AccountAction::AddLinkedUser) => "acct:addlink".into(),
            CallbackData::RemoveLinked(id) => format!("unlink:{}", id),
            CallbackData::HistoryPage(offset) => format!("hist:{}", offset),
            CallbackData::ProxyTool(ProxyToolAction::Validate(pt)) => {
                format!("px:val:{}", proxy_type_tag(*pt))
            }
            CallbackData::ProxyTool(ProxyToolAction::Extend(pt)) => {
                format!("px:ext:{}", proxy_type_tag(*pt))
            }
            CallbackData::ProxyTool(ProxyToolAction::ValidateAllPptp) => "px:valall".into(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "main" => return Some(CallbackData::MainMenu),
            "menu:socks5" => return Some(CallbackData::Menu(MenuTarget::Socks5)),
            "menu:pptp" => return Some(CallbackData::Menu(MenuTarget::Pptp)),
            "menu:account" => return Some(CallbackData::Menu(MenuTarget::Account)),
            "menu:tools" => return Some(CallbackData::Menu(MenuTarget::ProxyTools)),
            "menu:history" => return Some(CallbackData::Menu(MenuTarget::History)),
            "flt:state" => return Some(CallbackData::Filter(FilterKind::ByState)),
            "flt:city" => return Some(CallbackData::Filter(FilterKind::ByCity)),
            "flt:zip" => return Some(CallbackData::Filter(FilterKind::ByZip)),
            "flt:all" => return Some(CallbackData::Filter(FilterKind::All)),
            "more" => return Some(CallbackData::ShowMore),
            "buyflt" => return Some(CallbackData::BuyByFilter),
            "confirm" => return Some(CallbackData::ConfirmPurchase),
            "cancelbuy" => return Some(CallbackData::CancelPurchase),
            "backflt" => return Some(CallbackData::BackToFilter),
            "acct:deposit" => return Some(CallbackData::Account(AccountAction::Deposit)),
            "acct:link" => return Some(CallbackData::Account(AccountAction::LinkAccount)),
            "acct:linked" => return Some(CallbackData::Account(AccountAction::LinkedUsers)),
            "acct:addlink" => return Some(CallbackData::Account(AccountAction::AddLinkedUser)),
            "px:valall" => {
                return Some(CallbackData::ProxyTool(ProxyToolAction::ValidateAllPptp))
            }
            _ => {}
        }

        let (prefix, rest) = data.split_once(':')?;
        match prefix {
            "country" if !rest.is_empty() => Some(CallbackData::Country(rest.to_string())),
            "catalog" => rest.parse().ok().map(CallbackData::Catalog),
            "st" if !rest.is_empty() => Some(CallbackData::StatePick(rest.to_string())),
            "buy" => rest.parse().ok().map(CallbackData::Buy),
            "unlink" => rest.parse().ok().map(CallbackData::RemoveLinked),
            "hist" => rest.parse().ok().map(CallbackData::HistoryPage),
            "px" => {
                let (action, pt) = rest.split_once(':')?;
                let pt = parse_proxy_type(pt)?;
                match action {
                    "val" => Some(CallbackData::ProxyTool(ProxyToolAction::Validate(pt))),
                    "ext" => Some(CallbackData::ProxyTool(ProxyToolAction::Extend(pt))),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let samples = vec![
            CallbackData::MainMenu,
            CallbackData::Menu(MenuTarget::Pptp),
            CallbackData::Menu(MenuTarget::History),
            CallbackData::Country("US".into()),
            CallbackData::Catalog(12),
            CallbackData::Filter(FilterKind::ByZip),
            CallbackData::StatePick("New York".into()),
            CallbackData::ShowMore,
            CallbackData::Buy(42),
            CallbackData::BuyByFilter,
            CallbackData::ConfirmPurchase,
            CallbackData::CancelPurchase,
            CallbackData::BackToFilter,
            CallbackData::Account(AccountAction::Deposit),
            CallbackData::RemoveLinked(987654321),
            CallbackData::HistoryPage(20),
            CallbackData::ProxyTool(ProxyToolAction::Validate(ProxyType::Pptp)),
            CallbackData::ProxyTool(ProxyToolAction::Extend(ProxyType::Socks5)),
            CallbackData::ProxyTool(ProxyToolAction::ValidateAllPptp),
        ];
        for sample in samples {
            let encoded = sample.encode();
            assert!(encoded.len() <= 64, "payload too long: {}", encoded);
            assert_eq!(CallbackData::parse(&encoded), Some(sample));
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(CallbackData::parse(""), None);
        assert_eq!(CallbackData::parse("buy:"), None);
        assert_eq!(CallbackData::parse("buy:abc"), None);
        assert_eq!(CallbackData::parse("px:val:http"), None);
        assert_eq!(CallbackData::parse("country:"), None);
        assert_eq!(CallbackData::parse("nonsense"), None);
    }
}
