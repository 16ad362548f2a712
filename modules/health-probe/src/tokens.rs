//! Known-token table and human-readable amount formatting.

use regex::Regex;

struct TokenInfo {
    symbol: &'static str,
    decimals: u32,
}

/// Token contract addresses with known symbol and decimal count.
/// Lookup is case-insensitive on the address.
const KNOWN_TOKENS: &[(&str, TokenInfo)] = &[
    // USDC on Base
    ("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", TokenInfo { symbol: "USDC", decimals: 6 }),
    // USDC on Base Sepolia
    ("0x036cbd53842c5426634e7929541ec2318f3dcf7e", TokenInfo { symbol: "USDC", decimals: 6 }),
    // USDC on Avalanche C-Chain
    ("0xb97ef9ef8734c71904d8002f8b6bc66dd9c48a6e", TokenInfo { symbol: "USDC", decimals: 6 }),
    // USDC on Avalanche Fuji
    ("0x5425890298aed601595a70ab815c96711a31bc65", TokenInfo { symbol: "USDC", decimals: 6 }),
    // WETH on Base
    ("0x4200000000000000000000000000000000000006", TokenInfo { symbol: "WETH", decimals: 18 }),
];

fn lookup(asset: &str) -> Option<&'static TokenInfo> {
    KNOWN_TOKENS
        .iter()
        .find(|(addr, info)| addr.eq_ignore_ascii_case(asset) || info.symbol.eq_ignore_ascii_case(asset))
        .map(|(_, info)| info)
}

fn is_evm_address(s: &str) -> bool {
    let re = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
    re.is_match(s)
}

/// `0x833589…2913` style shorthand for an unknown contract address.
fn shorten_address(addr: &str) -> String {
    format!("{}…{}", &addr[..6], &addr[addr.len() - 4..])
}

/// Render an atomic-unit amount as `"<whole>[.<frac>] <symbol>"`.
///
/// Known assets use their table decimals; unknown ERC-20-shaped addresses
/// default to 18 decimals with a shortened-address symbol; any other asset
/// identifier passes through as the symbol with zero decimals. A
/// non-numeric amount renders as `"<raw> (raw)"` instead of failing.
pub fn format_amount(atomic: &str, asset: &str) -> String {
    let (symbol, decimals) = match lookup(asset) {
        Some(info) => (info.symbol.to_string(), info.decimals),
        None if is_evm_address(asset) => (shorten_address(asset), 18),
        None => (asset.to_string(), 0),
    };

    let value: u128 = match atomic.parse() {
        Ok(v) => v,
        Err(_) => return format!("{} (raw)", atomic),
    };

    let divisor = 10u128.pow(decimals);
    let whole = value / divisor;
    let frac = value % divisor;
    if frac == 0 {
        return format!("{} {}", whole, symbol);
    }
    let frac_str = format!("{:0width$}", frac, width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    format!("{}.{} {}", whole, trimmed, symbol)
}
