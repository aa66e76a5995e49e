use port_probe::ports::{default_ports, parse_ports_opt, parse_ports_str};

#[test]
fn parse_lists_and_ranges() {
    assert_eq!(parse_ports_str("22,80,443").expect("parse ok"), vec![22, 80, 443]);
    assert_eq!(parse_ports_str("1-3").expect("parse ok"), vec![1, 2, 3]);
    assert_eq!(parse_ports_str("80,1-3").expect("parse ok"), vec![80, 1, 2, 3]);
}

#[test]
fn empty_or_missing_spec_uses_defaults() {
    let expected = vec![
        21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389,
        5900, 8080,
    ];
    assert_eq!(parse_ports_str("").expect("parse ok"), expected);
    assert_eq!(parse_ports_opt(None).expect("parse ok"), expected);
    assert_eq!(default_ports(), expected);
}

#[test]
fn malformed_tokens_rejected() {
    for bad in ["abc", "5-", "-10", "1-2-3", "22,,80"] {
        assert!(parse_ports_str(bad).is_err(), "{bad} accepted");
    }
    let err = parse_ports_str("22,abc").unwrap_err();
    assert_eq!(err.token, "abc");
    assert!(err.to_string().contains("'abc'"));
}
