use test_case::test_case;
use twbl_fmt::{format_source, Options};
use twbl_syntax::{ParsedDocument, Parser, SymbolId};

fn fmt(src: &str) -> String {
    format_source(src, Options::default())
}

#[test]
fn uppercases_keywords_and_pads_operators() {
    let out = fmt("if [Sales]>100 then'High'else'Low'end");
    assert_eq!(out, "IF [Sales] > 100\nTHEN 'High'\nELSE 'Low'\nEND\n");
}

#[test]
fn case_arms_stay_inline() {
    let out = fmt(r#"case [R] when "N" then 1 when "S" then 2 else 0 end"#);
    assert_eq!(
        out,
        "CASE [R]\nWHEN \"N\" THEN 1\nWHEN \"S\" THEN 2\nELSE 0\nEND\n"
    );
}

#[test]
fn nested_blocks_indent() {
    let out = fmt("IF [a]>0 THEN IF [b]>0 THEN 1 ELSE 2 END ELSE 3 END");
    assert_eq!(
        out,
        "IF [a] > 0\nTHEN\n    IF [b] > 0\n    THEN 1\n    ELSE 2\n    END\nELSE 3\nEND\n"
    );
}

#[test]
fn simple_calls_stay_inline() {
    let out = fmt("SUM( [Sales] )");
    assert_eq!(out, "SUM([Sales])\n");
}

#[test]
fn complex_argument_lists_expand() {
    let out = fmt("DATEDIFF('day',[Start],[End])");
    assert_eq!(
        out,
        "DATEDIFF(\n    'day',\n    [Start],\n    [End]\n)\n"
    );
}

#[test]
fn nested_call_forces_expansion() {
    let out = fmt("ZN(SUM([Profit]))");
    assert_eq!(out, "ZN(\n    SUM([Profit])\n)\n");
}

#[test]
fn lod_expressions_keep_brace_padding() {
    let out = fmt("{fixed [Customer]:SUM([Sales])}");
    assert_eq!(out, "{ FIXED [Customer] : SUM([Sales]) }\n");
}

#[test]
fn unary_minus_stays_attached() {
    let out = fmt("IIF([a]>0,1,-1)");
    assert_eq!(out, "IIF(\n    [a] > 0,\n    1,\n    -1\n)\n");
}

#[test]
fn logical_keywords_uppercase() {
    let out = fmt("[a]>0 and not [b]>0 or [c] in ('x')");
    assert_eq!(out, "[a] > 0 AND NOT [b] > 0 OR [c] IN ('x')\n");
}

#[test]
fn blank_lines_between_statements_collapse_to_one() {
    let out = fmt("SUM([a])\n\n\n\nAVG([b])");
    assert_eq!(out, "SUM([a])\n\nAVG([b])\n");
}

#[test]
fn line_comments_keep_their_line() {
    let out = fmt("// note\nSUM([Sales])");
    assert_eq!(out, "// note\nSUM([Sales])\n");
}

#[test_case("IF [Sales] > 100 THEN 'High' ELSE 'Low' END")]
#[test_case("case [R] when 'N' then 1 else 0 end")]
#[test_case("DATEDIFF('day', [Start], [End])")]
#[test_case("{ FIXED [Customer] : SUM([Sales]) }")]
#[test_case("ZN(SUM(AVG([x])))")]
#[test_case("[Sales] +")]
#[test_case("SUM([a])\n\nAVG([b])")]
#[test_case("if [a]>0 then if [b]>0 then 1 else 2 end else 3 end")]
fn formatting_is_idempotent(src: &str) {
    let once = fmt(src);
    let twice = fmt(&once);
    assert_eq!(once, twice);
}

fn shape(doc: &ParsedDocument, id: SymbolId) -> (String, String, Vec<(String, String)>) {
    fn collect(doc: &ParsedDocument, id: SymbolId, out: &mut Vec<(String, String)>) {
        for &child in &doc[id].children {
            out.push((doc[child].kind.tag().to_string(), doc[child].name.clone()));
            collect(doc, child, out);
        }
    }

    let mut children = Vec::new();
    collect(doc, id, &mut children);
    (
        doc[id].kind.tag().to_string(),
        doc[id].name.clone(),
        children,
    )
}

#[test_case("IF [Sales] > 100 THEN 'High' ELSE 'Low' END")]
#[test_case("SUM(AVG([Sales]))")]
#[test_case("{ FIXED [Customer] : SUM([Sales]) }")]
#[test_case("case [R] when 'N' then 1 else 0 end")]
fn formatting_preserves_structure(src: &str) {
    let before = Parser::new(src).parse();
    let after = Parser::new(&fmt(src)).parse();

    assert_eq!(
        shape(&before, before.root()),
        shape(&after, after.root()),
        "tree shape changed for {src:?}"
    );
}
