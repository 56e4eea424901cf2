use twbl_syntax::symbol::{BlockKind, BranchKind, LitValue, LodType};
use twbl_syntax::{ParseErrorKind, ParsedDocument, Parser, Position, SymbolId, SymbolKind};

fn parse(src: &str) -> ParsedDocument {
    let doc = Parser::new(src).parse();
    doc.validate().expect("parser must produce a valid tree");
    doc
}

fn kinds_of(doc: &ParsedDocument, ids: &[SymbolId]) -> Vec<&'static str> {
    ids.iter().map(|&id| doc[id].kind.tag()).collect()
}

#[test]
fn if_then_else_block() {
    let doc = parse(r#"IF [Sales] > 100 THEN "High" ELSE "Low" END"#);

    let top = doc.top_level();
    assert_eq!(top.len(), 1);

    let block = &doc[top[0]];
    assert_eq!(block.name, "IF");
    let b = block.kind.as_conditional_block().unwrap();
    assert_eq!(b.block_kind, BlockKind::If);
    assert!(!b.incomplete);
    assert!(block.end_keyword.is_some());

    let branches: Vec<_> = block
        .children
        .iter()
        .filter(|&&c| doc[c].is_branch())
        .map(|&c| doc[c].name.clone())
        .collect();
    assert_eq!(branches, vec!["THEN", "ELSE"]);
    assert!(doc.errors.is_empty());
}

#[test]
fn nested_function_calls() {
    let doc = parse("SUM(AVG([Sales]))");

    let top = doc.top_level();
    assert_eq!(top.len(), 1);

    let sum = &doc[top[0]];
    assert_eq!(sum.name, "SUM");
    assert!(sum.kind.as_function_call().unwrap().balanced);
    assert_eq!(sum.arguments.len(), 1);
    assert_eq!(sum.arguments[0].text, "AVG([Sales])");

    let avg_id = sum
        .children
        .iter()
        .copied()
        .find(|&c| doc[c].kind.as_function_call().is_some())
        .unwrap();
    let avg = &doc[avg_id];
    assert_eq!(avg.name, "AVG");
    assert_eq!(avg.arguments.len(), 1);

    let field = avg
        .children
        .iter()
        .copied()
        .find(|&c| doc[c].kind.as_field_reference().is_some())
        .unwrap();
    assert_eq!(doc[field].name, "Sales");
}

#[test]
fn lod_expression() {
    let doc = parse("{ FIXED [Customer] : SUM([Sales]) }");

    let top = doc.top_level();
    assert_eq!(top.len(), 1);

    let lod = &doc[top[0]];
    let l = lod.kind.as_lod_expression().unwrap();
    assert_eq!(l.lod_type, LodType::Fixed);
    assert!(l.has_colon);
    assert!(l.has_aggregation);
    assert!(!l.incomplete);

    let child_kinds = kinds_of(&doc, &lod.children);
    assert!(child_kinds.contains(&"field"));
    assert!(child_kinds.contains(&"call"));
    assert!(doc.errors.is_empty());
}

#[test]
fn unclosed_block_is_incomplete() {
    let doc = parse(r#"IF [Sales] > 100 THEN "High" ELSE "Low""#);

    let block = &doc[doc.top_level()[0]];
    assert!(block.kind.as_conditional_block().unwrap().incomplete);
    assert!(block.end_keyword.is_none());

    assert!(doc
        .errors
        .iter()
        .any(|e| matches!(e.kind, ParseErrorKind::UnclosedBlock { keyword: "IF" })));
}

#[test]
fn logical_keywords_are_never_calls() {
    let doc = parse("[Sales] > 100 AND [Profit] > 0 OR NOT [Discount] > 0.1");

    let calls = doc
        .symbols()
        .filter(|(_, d)| d.kind.as_function_call().is_some())
        .count();
    assert_eq!(calls, 0);

    let keywords: Vec<_> = doc
        .symbols()
        .filter(|(_, d)| matches!(d.kind, SymbolKind::Keyword))
        .map(|(_, d)| d.name.clone())
        .collect();
    assert!(keywords.contains(&"AND".to_string()));
    assert!(keywords.contains(&"OR".to_string()));
    assert!(keywords.contains(&"NOT".to_string()));

    let fields: Vec<_> = doc
        .symbols()
        .filter(|(_, d)| d.kind.as_field_reference().is_some())
        .map(|(_, d)| d.name.clone())
        .collect();
    assert_eq!(fields.len(), 3);
    for name in ["Sales", "Profit", "Discount"] {
        assert!(fields.contains(&name.to_string()));
    }
}

#[test]
fn case_block_branches() {
    let doc = parse(r#"CASE [R] WHEN "N" THEN 1 WHEN "S" THEN 2 ELSE 0 END"#);

    let block = &doc[doc.top_level()[0]];
    assert_eq!(block.name, "CASE");
    assert!(block.end_keyword.is_some());

    let branches: Vec<_> = block
        .children
        .iter()
        .copied()
        .filter(|&c| doc[c].is_branch())
        .collect();
    assert_eq!(branches.len(), 3);

    let branch_kinds: Vec<_> = branches
        .iter()
        .map(|&b| doc[b].kind.as_branch().unwrap().branch_kind)
        .collect();
    assert_eq!(
        branch_kinds,
        vec![BranchKind::When, BranchKind::When, BranchKind::Else]
    );
}

#[test]
fn mismatched_end_is_reported_but_parsing_continues() {
    let doc = parse("SUM([Sales]) END");

    assert!(doc
        .errors
        .iter()
        .any(|e| e.kind == ParseErrorKind::MismatchedEnd));
    assert_eq!(doc[doc.top_level()[0]].name, "SUM");
}

#[test]
fn empty_input_has_no_symbols() {
    let doc = parse("");
    assert!(doc.top_level().is_empty());
    assert!(doc.errors.is_empty());
}

#[test]
fn unbalanced_call_has_empty_arguments() {
    let doc = parse("DATEDIFF('day', [Start],");

    let call = &doc[doc.top_level()[0]];
    assert_eq!(call.name, "DATEDIFF");
    assert!(!call.kind.as_function_call().unwrap().balanced);
    assert!(call.arguments.is_empty());
}

#[test]
fn multi_line_symbols_cover_all_lines() {
    let doc = parse("SUM(\n    [Sales]\n)");

    let call = &doc[doc.top_level()[0]];
    assert_eq!(call.range.start.line, 1);
    assert_eq!(call.range.end.line, 3);
    assert_eq!(call.arguments.len(), 1);
}

#[test]
fn elseif_keyword_wins_over_expression() {
    let doc = parse("IF [x] > 0 THEN 1 ELSEIF [x] < 0 THEN -1 ELSE 0 END");

    let block = &doc[doc.top_level()[0]];
    let branches: Vec<_> = block
        .children
        .iter()
        .copied()
        .filter(|&c| doc[c].is_branch())
        .map(|c| doc[c].name.clone())
        .collect();
    assert_eq!(branches, vec!["THEN", "ELSEIF", "ELSE"]);

    // The residue after ELSEIF becomes the branch's condition content.
    let elseif = block
        .children
        .iter()
        .copied()
        .find(|&c| doc[c].name == "ELSEIF")
        .unwrap();
    assert!(doc[elseif]
        .children
        .iter()
        .any(|&c| doc[c].kind.as_field_reference().is_some()));
}

#[test]
fn nested_blocks() {
    let doc = parse("IF [a] > 0 THEN IF [b] > 0 THEN 1 ELSE 2 END ELSE 3 END");

    let outer = &doc[doc.top_level()[0]];
    assert!(!outer.kind.as_conditional_block().unwrap().incomplete);

    let then_branch = outer
        .children
        .iter()
        .copied()
        .find(|&c| doc[c].name == "THEN")
        .unwrap();
    let inner = doc[then_branch]
        .children
        .iter()
        .copied()
        .find(|&c| doc[c].is_block())
        .unwrap();
    assert!(!doc[inner].kind.as_conditional_block().unwrap().incomplete);
    assert!(doc[inner].end_keyword.is_some());
}

#[test]
fn blocks_inside_call_arguments() {
    let doc = parse("ZN(IF [a] > 0 THEN 1 ELSE 0 END)");

    let call = &doc[doc.top_level()[0]];
    assert_eq!(call.name, "ZN");
    assert_eq!(call.arguments.len(), 1);

    let inner = call
        .children
        .iter()
        .copied()
        .find(|&c| doc[c].is_block())
        .unwrap();
    assert!(doc[inner].end_keyword.is_some());
}

#[test]
fn region_parse_offsets_lines() {
    let doc = Parser::new("SUM([Sales])").with_base_line(10).parse();
    let call = &doc[doc.top_level()[0]];
    assert_eq!(call.range.start.line, 11);
}

#[test]
fn literal_values() {
    let doc = parse(r#"IIF(TRUE, 'yes', 1.5)"#);
    let call = &doc[doc.top_level()[0]];

    let values: Vec<_> = call
        .children
        .iter()
        .filter_map(|&c| doc[c].kind.as_literal().map(|l| l.value.clone()))
        .collect();
    assert!(values.contains(&LitValue::Bool(true)));
    assert!(values.contains(&LitValue::String("yes".into())));
    assert!(values.contains(&LitValue::Number(1.5)));
}

#[test]
fn symbol_at_finds_innermost() {
    let doc = parse("SUM(AVG([Sales]))");

    let id = doc.symbol_at(Position::new(1, 10)).unwrap();
    assert_eq!(doc[id].kind.tag(), "field");

    let block = doc.symbol_at(Position::new(1, 1)).unwrap();
    assert_eq!(doc[block].name, "SUM");
}

#[test]
fn type_hint_from_leading_doc_comment() {
    let doc = parse("/** @type {Boolean} */\n[Sales] > 100");
    assert_eq!(
        doc[doc.root()].jsdoc_type_hint.as_deref(),
        Some("Boolean")
    );
    // The hint travels with the tree dump.
    assert_eq!(doc.to_json()["typeHint"], "Boolean");
}

#[test]
fn plain_comments_carry_no_type_hint() {
    let doc = parse("// Boolean\n/* @type {Number} */\n[Sales] > 100");
    assert_eq!(doc[doc.root()].jsdoc_type_hint, None);
}

#[test]
fn parser_never_fails_on_garbage() {
    for src in [
        "@@@@",
        "))))((((",
        "END END END",
        "THEN ELSE WHEN",
        "{ } [ ' \"",
        "IF IF IF",
        "} } {",
        "CASE WHEN WHEN THEN",
    ] {
        let doc = Parser::new(src).parse();
        doc.validate().unwrap();
    }
}

#[test]
fn splice_top_level_symbols() {
    let mut doc = parse("SUM([Sales])\nAVG([Profit])\nMIN([Cost])");
    assert_eq!(doc.top_level().len(), 3);

    let donor = Parser::new("MAX([Profit])").with_base_line(1).parse();
    let at = doc.remove_top_level_in_lines(2, 2);
    assert_eq!(doc.top_level().len(), 2);

    doc.insert_top_level_from(&donor, at);
    doc.rebuild_line_index();
    doc.validate().unwrap();

    let names: Vec<_> = doc
        .top_level()
        .iter()
        .map(|&id| doc[id].name.clone())
        .collect();
    assert_eq!(names, vec!["SUM", "MAX", "MIN"]);
}
