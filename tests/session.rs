//! End-to-end session tests over hand-built reader fixtures: a base ROM
//! image and a patch image that shadows some of its symbols.

use std::collections::{BTreeMap, HashMap, HashSet};

use gimli::constants as gim_con;
use gimli::DwAt;
use indexmap::IndexMap;

use romdb::locexpr::LocOp;
use romdb::{
    AttrRecord, AttrValue, DebugReader, Error, FrameRules, MemberRef, RegisterSet,
    ScopeMap, ScopeNode, Session, SymbolRef, UnwindRule, GLOBALS_SCOPE,
};

fn r(n: u64) -> SymbolRef {
    SymbolRef(n)
}

#[derive(Default)]
struct FakeReader {
    pointer_size: u64,
    vars: ScopeMap<SymbolRef>,
    funcs: ScopeMap<SymbolRef>,
    types: ScopeMap<SymbolRef>,
    enums: ScopeMap<SymbolRef>,
    cus: BTreeMap<String, Vec<SymbolRef>>,
    econsts: IndexMap<String, i64>,
    records: HashMap<SymbolRef, AttrRecord>,
    attrs: HashMap<(SymbolRef, DwAt), AttrValue>,
    locations: HashMap<SymbolRef, Vec<LocOp>>,
    ranges: HashMap<SymbolRef, Vec<(u64, u64)>>,
    params: HashMap<SymbolRef, Vec<(String, SymbolRef)>>,
    locals: HashMap<SymbolRef, Vec<(String, SymbolRef)>>,
    inlines: HashMap<SymbolRef, Vec<SymbolRef>>,
    rets: HashMap<SymbolRef, SymbolRef>,
    external: HashSet<SymbolRef>,
    unwind: HashMap<SymbolRef, FrameRules>,
    unwind_ranges: Vec<((u64, u64), FrameRules)>,
    cu_types: HashMap<SymbolRef, ScopeMap<SymbolRef>>,
    cu_enums: HashMap<SymbolRef, ScopeMap<SymbolRef>>,
    source_lines: HashMap<SymbolRef, (String, u32)>,
}

impl DebugReader for FakeReader {
    fn variables(&self) -> ScopeMap<SymbolRef> {
        self.vars.clone()
    }

    fn functions(&self, _include_abstract: bool) -> ScopeMap<SymbolRef> {
        self.funcs.clone()
    }

    fn types(&self) -> ScopeMap<SymbolRef> {
        self.types.clone()
    }

    fn enums(&self) -> ScopeMap<SymbolRef> {
        self.enums.clone()
    }

    fn compilation_units(&self) -> BTreeMap<String, Vec<SymbolRef>> {
        self.cus.clone()
    }

    fn enumerators(&self) -> IndexMap<String, i64> {
        self.econsts.clone()
    }

    fn variable_record(&self, rref: SymbolRef) -> Result<AttrRecord, Error> {
        self.records
            .get(&rref)
            .cloned()
            .ok_or_else(|| Error::UnknownSymbol(format!("ref {:#x}", rref.0)))
    }

    fn type_record(&self, rref: SymbolRef) -> Result<AttrRecord, Error> {
        self.variable_record(rref)
    }

    fn cu_types(&self, refs: &[SymbolRef]) -> ScopeMap<SymbolRef> {
        let mut out = ScopeMap::new();
        for rref in refs {
            if let Some(map) = self.cu_types.get(rref) {
                out.extend(map.clone());
            }
        }
        out
    }

    fn cu_enums(&self, refs: &[SymbolRef]) -> ScopeMap<SymbolRef> {
        let mut out = ScopeMap::new();
        for rref in refs {
            if let Some(map) = self.cu_enums.get(rref) {
                out.extend(map.clone());
            }
        }
        out
    }

    fn formal_parameters(&self, rref: SymbolRef) -> Vec<(String, SymbolRef)> {
        self.params.get(&rref).cloned().unwrap_or_default()
    }

    fn local_variables(&self, rref: SymbolRef) -> Vec<(String, SymbolRef)> {
        self.locals.get(&rref).cloned().unwrap_or_default()
    }

    fn inline_calls(&self, rref: SymbolRef) -> Vec<SymbolRef> {
        self.inlines.get(&rref).cloned().unwrap_or_default()
    }

    fn return_type(&self, rref: SymbolRef) -> Option<SymbolRef> {
        self.rets.get(&rref).copied()
    }

    fn ranges(&self, rref: SymbolRef) -> Option<Vec<(u64, u64)>> {
        self.ranges.get(&rref).cloned()
    }

    fn attr(&self, rref: SymbolRef, at: DwAt) -> Option<AttrValue> {
        self.attrs.get(&(rref, at)).cloned()
    }

    fn location(&self, rref: SymbolRef, _pc: u64, _has_started: bool) -> Option<Vec<LocOp>> {
        self.locations.get(&rref).cloned()
    }

    fn unwind_info(
        &self,
        rref: SymbolRef,
        _pc_offset: u64,
        _regs: &RegisterSet,
    ) -> Option<FrameRules> {
        self.unwind.get(&rref).cloned()
    }

    fn unwind_at_pc(&self, pc: u64, _regs: &RegisterSet) -> Option<FrameRules> {
        self.unwind_ranges
            .iter()
            .find(|((lo, hi), _)| *lo <= pc && pc < *hi)
            .map(|(_, rules)| rules.clone())
    }

    fn source_line(&self, rref: SymbolRef, _pc: u64) -> Option<(String, u32)> {
        self.source_lines.get(&rref).cloned()
    }

    fn is_external(&self, rref: SymbolRef) -> bool {
        self.external.contains(&rref)
    }

    fn pointer_size(&self) -> u64 {
        self.pointer_size
    }
}

fn scope_tree(scopes: &[(&str, &[(&str, SymbolRef)])]) -> ScopeMap<SymbolRef> {
    scopes
        .iter()
        .map(|(scope, members)| {
            (
                scope.to_string(),
                ScopeNode::Scope(
                    members
                        .iter()
                        .map(|(n, r)| (n.to_string(), ScopeNode::Leaf(*r)))
                        .collect(),
                ),
            )
        })
        .collect()
}

fn base_type(name: &str, size: u64, signed: bool) -> AttrRecord {
    AttrRecord {
        tag: gim_con::DW_TAG_base_type,
        name: name.to_string(),
        byte_size: Some(size),
        signed: Some(signed),
        ..AttrRecord::default()
    }
}

fn var(name: &str, type_name: &str, size: u64) -> AttrRecord {
    AttrRecord {
        tag: gim_con::DW_TAG_base_type,
        name: name.to_string(),
        type_name: Some(type_name.to_string()),
        byte_size: Some(size),
        ..AttrRecord::default()
    }
}

fn rules(cfa_offset: i64) -> FrameRules {
    FrameRules {
        cfa_register: 13,
        cfa_offset,
        registers: [(14, UnwindRule::CfaOffset(-4))].into_iter().collect(),
    }
}

fn addr_expr(addr: u64) -> Vec<LocOp> {
    vec![LocOp::with_arg(gim_con::DW_OP_addr, addr)]
}

fn rom() -> FakeReader {
    let mut f = FakeReader {
        pointer_size: 4,
        ..FakeReader::default()
    };

    f.vars = scope_tree(&[
        ("main.c", &[("counter", r(10)), ("state", r(11))]),
        (GLOBALS_SCOPE, &[("g_ticks", r(12))]),
    ]);
    f.funcs = scope_tree(&[
        ("main.c", &[("init", r(20)), ("helper", r(21))]),
        ("util.c", &[("helper", r(22))]),
    ]);
    f.types = scope_tree(&[
        (
            "main.c",
            &[
                ("Foo", r(40)),
                ("uint16", r(42)),
                ("word", r(44)),
                ("int16", r(46)),
                ("sword", r(47)),
                ("Opaque", r(48)),
            ],
        ),
        ("util.c", &[("Foo", r(41)), ("struct bar", r(45))]),
    ]);
    f.enums = scope_tree(&[(
        "main.c",
        &[("mode_t", r(50)), ("enum colour", r(51))],
    )]);
    f.cus = [
        ("src/main.c".to_string(), vec![r(1)]),
        ("src/util.c".to_string(), vec![r(2)]),
    ]
    .into_iter()
    .collect();
    f.econsts = [("OFF".to_string(), 0i64), ("ON".to_string(), 1)]
        .into_iter()
        .collect();

    f.records.insert(r(10), var("counter", "uint16", 2));
    f.records.insert(r(11), var("state", "uint8", 1));
    f.records.insert(r(12), var("g_ticks", "uint32", 4));
    f.records.insert(r(30), var("mode", "mode_t", 1));
    f.records.insert(r(31), var("tmp", "uint16", 2));

    f.records.insert(
        r(40),
        AttrRecord {
            tag: gim_con::DW_TAG_structure_type,
            name: "Foo".to_string(),
            ..AttrRecord::default()
        },
    );
    f.records.insert(
        r(41),
        AttrRecord {
            tag: gim_con::DW_TAG_structure_type,
            name: "Foo".to_string(),
            byte_size: Some(8),
            members: vec![MemberRef {
                name: "a".to_string(),
                offset: 0,
                rref: r(42),
            }],
            ..AttrRecord::default()
        },
    );
    f.records.insert(r(42), base_type("uint16", 2, false));
    f.records.insert(
        r(44),
        AttrRecord {
            base_type_name: Some("uint16".to_string()),
            signed: None,
            ..base_type("word", 2, false)
        },
    );
    f.records.insert(r(46), base_type("int16", 2, true));
    f.records.insert(
        r(47),
        AttrRecord {
            base_type_name: Some("int16".to_string()),
            signed: None,
            ..base_type("sword", 2, false)
        },
    );
    f.records.insert(
        r(45),
        AttrRecord {
            tag: gim_con::DW_TAG_structure_type,
            name: "struct bar".to_string(),
            byte_size: Some(12),
            ..AttrRecord::default()
        },
    );
    f.records.insert(
        r(48),
        AttrRecord {
            tag: gim_con::DW_TAG_structure_type,
            name: "Opaque".to_string(),
            ..AttrRecord::default()
        },
    );
    f.records.insert(
        r(50),
        AttrRecord {
            tag: gim_con::DW_TAG_enumeration_type,
            name: "mode_t".to_string(),
            byte_size: Some(1),
            enumerators: [("OFF".to_string(), 0i64), ("ON".to_string(), 1)]
                .into_iter()
                .collect(),
            ..AttrRecord::default()
        },
    );
    f.records.insert(
        r(51),
        AttrRecord {
            tag: gim_con::DW_TAG_enumeration_type,
            name: "enum colour".to_string(),
            byte_size: Some(1),
            enumerators: [("RED".to_string(), 0i64), ("GREEN".to_string(), 1)]
                .into_iter()
                .collect(),
            ..AttrRecord::default()
        },
    );

    // Signedness chase chains for the typedef'd base types.
    f.attrs
        .insert((r(44), gim_con::DW_AT_type), AttrValue::Ref(r(42)));
    f.attrs.insert(
        (r(42), gim_con::DW_AT_encoding),
        AttrValue::Encoding(gim_con::DW_ATE_unsigned),
    );
    f.attrs
        .insert((r(47), gim_con::DW_AT_type), AttrValue::Ref(r(46)));
    f.attrs.insert(
        (r(46), gim_con::DW_AT_encoding),
        AttrValue::Encoding(gim_con::DW_ATE_signed),
    );

    f.attrs
        .insert((r(20), gim_con::DW_AT_name), AttrValue::Str("init".to_string()));
    f.attrs.insert(
        (r(21), gim_con::DW_AT_name),
        AttrValue::Str("helper".to_string()),
    );
    f.attrs.insert(
        (r(22), gim_con::DW_AT_name),
        AttrValue::Str("helper".to_string()),
    );
    // Inlined instance of helper inside init.
    f.attrs.insert(
        (r(23), gim_con::DW_AT_abstract_origin),
        AttrValue::Ref(r(21)),
    );

    // init's high value is a length, the producer quirk under test.
    f.ranges.insert(r(20), vec![(0x1000, 0x80)]);
    f.ranges.insert(r(21), vec![(0x1100, 0x1180)]);
    f.ranges.insert(r(22), vec![(0x2000, 0x2080)]);
    f.ranges.insert(r(23), vec![(0x1010, 0x1020)]);
    f.ranges.insert(r(1), vec![(0x1000, 0x2000)]);
    f.ranges.insert(r(2), vec![(0x2000, 0x3000)]);

    f.params.insert(r(20), vec![("mode".to_string(), r(30))]);
    f.locals.insert(r(20), vec![("tmp".to_string(), r(31))]);
    f.inlines.insert(r(20), vec![r(23)]);
    f.rets.insert(r(20), r(42));

    f.external.extend([r(12), r(20), r(22)]);

    f.unwind.insert(r(20), rules(8));
    f.unwind_ranges.push(((0x1000, 0x1080), rules(8)));

    f.locations.insert(r(10), addr_expr(0x4000));
    f.locations.insert(r(12), addr_expr(0x4100));
    f.locations
        .insert(r(11), vec![LocOp::new(gim_con::DW_OP_reg3)]);
    f.locations
        .insert(r(31), vec![LocOp::new(gim_con::DW_OP_reg3)]);

    f.source_lines
        .insert(r(20), ("src/main.c".to_string(), 42));

    let main_types: ScopeMap<SymbolRef> = [
        ("Foo", r(40)),
        ("uint16", r(42)),
        ("word", r(44)),
        ("int16", r(46)),
        ("sword", r(47)),
        ("Opaque", r(48)),
    ]
    .into_iter()
    .map(|(n, rr)| (n.to_string(), ScopeNode::Leaf(rr)))
    .collect();
    f.cu_types.insert(r(1), main_types);
    f.cu_types.insert(
        r(2),
        [("Foo", r(41)), ("struct bar", r(45))]
            .into_iter()
            .map(|(n, rr)| (n.to_string(), ScopeNode::Leaf(rr)))
            .collect(),
    );
    f.cu_enums.insert(
        r(1),
        [("mode_t", r(50))]
            .into_iter()
            .map(|(n, rr)| (n.to_string(), ScopeNode::Leaf(rr)))
            .collect(),
    );

    f
}

fn patch() -> FakeReader {
    let mut f = FakeReader {
        pointer_size: 4,
        ..FakeReader::default()
    };
    f.vars = scope_tree(&[("main.c", &[("counter", r(110))])]);
    f.funcs = scope_tree(&[("main.c", &[("init", r(120))])]);
    f.cus = [("src/patch.c".to_string(), vec![r(101)])]
        .into_iter()
        .collect();
    f.records.insert(r(110), var("counter", "uint16", 2));
    f.locations.insert(r(110), addr_expr(0x8000));
    f.attrs
        .insert((r(120), gim_con::DW_AT_name), AttrValue::Str("init".to_string()));
    f.ranges.insert(r(120), vec![(0x7000, 0x7080)]);
    f.ranges.insert(r(101), vec![(0x7000, 0x8000)]);
    f.external.extend([r(110), r(120)]);
    f.econsts = [("PATCHED".to_string(), 1i64)].into_iter().collect();
    f
}

fn rom_session() -> Session<FakeReader> {
    Session::new(vec![rom()], Default::default())
}

fn combined_session() -> Session<FakeReader> {
    let rom = Session::new(vec![rom()], Default::default());
    let patch = Session::new(vec![patch()], Default::default());
    Session::combine(vec![rom, patch]).unwrap()
}

#[test]
fn variables_route_to_their_source() {
    let s = combined_session();
    // counter was shadowed by the patch image.
    let counter = s.get_variable("counter").unwrap();
    assert_eq!(counter.static_location(), Some(0x8000));
    // g_ticks only exists in the ROM.
    let ticks = s.get_variable("g_ticks").unwrap();
    assert_eq!(ticks.static_location(), Some(0x4100));
}

#[test]
fn functions_route_to_their_source() {
    let s = combined_session();
    let init = s.get_function("init").unwrap();
    assert_eq!(init.address().unwrap(), 0x7000);
    // helper was not patched; the ROM range survives.
    let helper = s.get_cu_function("util.c", "helper").unwrap();
    assert_eq!(helper.address().unwrap(), 0x2000);
}

#[test]
fn register_resident_variables_have_no_static_location() {
    let s = rom_session();
    let state = s.get_variable("state").unwrap();
    assert_eq!(state.static_location(), None);
}

#[test]
fn global_lookup_distinguishes_locals() {
    let s = rom_session();
    assert!(s.get_global_variable("g_ticks").is_ok());
    match s.get_global_variable("state") {
        Err(Error::NotAGlobal(name)) => assert_eq!(name, "state"),
        other => panic!("expected NotAGlobal, got {:?}", other.err()),
    }
    assert!(matches!(
        s.get_global_variable("missing"),
        Err(Error::UnknownSymbol(_))
    ));
}

#[test]
fn ambiguous_function_prefers_the_global_definition() {
    let s = rom_session();
    // Two helpers exist; only util.c's has external linkage.
    let helper = s.get_function("helper").unwrap();
    assert_eq!(helper.address().unwrap(), 0x2000);
    // A scope qualifier picks the static explicitly.
    let local = s.get_function("main.c::helper").unwrap();
    assert_eq!(local.address().unwrap(), 0x1100);
}

#[test]
fn ambiguous_variable_lookup_is_an_error() {
    let s = rom_session();
    let all = s.get_variable_all("counter").unwrap();
    assert_eq!(all.len(), 1);
    assert!(matches!(
        s.get_function_addr("missing_fn"),
        Err(Error::UnknownSymbol(_))
    ));
}

#[test]
fn relative_high_addresses_are_corrected() {
    let s = rom_session();
    let init = s.get_function("init").unwrap();
    assert_eq!(init.address().unwrap(), 0x1000);
    assert_eq!(init.end_address().unwrap(), 0x1080);
    assert_eq!(init.size().unwrap(), 0x80);
    assert!(init.contains(0x1040).unwrap());
    assert!(!init.contains(0x1080).unwrap());
}

#[test]
fn inline_calls_take_names_from_their_origin() {
    let s = rom_session();
    let init = s.get_function("init").unwrap();
    assert!(!init.is_inline());
    let inlined = init.inline_calls();
    assert_eq!(inlined.len(), 1);
    assert!(inlined[0].is_inline());
    assert_eq!(inlined[0].name().as_deref(), Some("helper"));
}

#[test]
fn signatures_render_like_c() {
    let s = rom_session();
    let init = s.get_function("init").unwrap();
    assert_eq!(
        init.signature().unwrap(),
        vec![("mode_t".to_string(), "mode".to_string())]
    );
    assert_eq!(
        init.signature_string().unwrap(),
        "uint16 init(mode_t mode)"
    );
}

#[test]
fn offset_function_translates_and_clamps() {
    let s = rom_session();
    let init = s.get_function("init").unwrap();

    // Same load address (thumb bit aside) needs no wrapper.
    assert!(init.with_load_address(0x1001, 0).unwrap().is_none());

    // Moved to 0x7000 with 0x10 bytes of preamble in front.
    let moved = init.with_load_address(0x7001, 0x90).unwrap().unwrap();
    assert_eq!(moved.preamble_size(), 0x10);
    assert_eq!(moved.address().unwrap(), 0x7000);
    assert_eq!(moved.end_address().unwrap(), 0x7090);
    assert!(moved.contains(0x7005).unwrap());
    assert!(!moved.contains(0x7090).unwrap());

    // A pc inside the preamble clamps to the function entry.
    assert_eq!(moved.to_debug_pc(0x7008).unwrap(), 0x1000);
    // A pc past the preamble lands at the matching debug address.
    assert_eq!(moved.to_debug_pc(0x7050).unwrap(), 0x1040);
}

#[test]
fn type_resolution_prefers_definitions() {
    let s = rom_session();
    // Foo is declared in main.c and defined in util.c.
    let foo = s.get_type("Foo").unwrap();
    assert_eq!(foo.type_name().unwrap(), "Foo");
    assert_eq!(foo.byte_size().unwrap(), 8);
    assert!(!foo.is_declaration().unwrap());
    let members = foo.members().unwrap();
    assert_eq!(members[0].0, "a");
    assert_eq!(members[0].2.type_name().unwrap(), "uint16");
}

#[test]
fn pointer_declarators_build_derived_types() {
    let s = rom_session();
    let p = s.get_type("Foo *").unwrap();
    assert_eq!(p.type_name().unwrap(), "Foo *");
    assert_eq!(p.byte_size().unwrap(), 4);
    let rec = p.record().unwrap();
    assert_eq!(rec.tag, gim_con::DW_TAG_pointer_type);
    assert_eq!(rec.pointed_to.as_ref().unwrap().name, "Foo");
}

#[test]
fn array_declarators_build_derived_types() {
    let s = rom_session();
    let a = s.get_type("Foo[3]").unwrap();
    assert_eq!(a.type_name().unwrap(), "Foo[3]");
    assert_eq!(a.byte_size().unwrap(), 24);
    let rec = a.record().unwrap();
    assert_eq!(rec.num_elements, Some(3));

    let multi = s.get_type("uint16[2][3]").unwrap();
    assert_eq!(multi.type_name().unwrap(), "uint16[2][3]");
    assert_eq!(multi.byte_size().unwrap(), 12);
}

#[test]
fn struct_prefix_fallback() {
    let s = rom_session();
    let bar = s.get_type("bar").unwrap();
    assert_eq!(bar.type_name().unwrap(), "struct bar");
    assert_eq!(bar.byte_size().unwrap(), 12);
}

#[test]
fn declaration_only_types_are_undefined() {
    let s = rom_session();
    match s.get_type("Opaque") {
        Err(Error::UndefinedType { name, declarations }) => {
            assert_eq!(name, "Opaque");
            assert_eq!(declarations, 1);
        }
        other => panic!("expected UndefinedType, got {:?}", other.err()),
    }
}

#[test]
fn typedef_signedness_follows_the_alias_chain() {
    let s = rom_session();
    assert!(!s.get_type("word").unwrap().is_signed().unwrap());
    assert!(s.get_type("sword").unwrap().is_signed().unwrap());
    assert!(s.get_type("int16").unwrap().is_signed().unwrap());
}

#[test]
fn type_names_deduplicate_across_units() {
    let s = rom_session();
    let names = s.get_type_names().unwrap();
    assert_eq!(names.iter().filter(|n| *n == &"Foo".to_string()).count(), 1);
    assert!(names.contains(&"word".to_string()));
}

#[test]
fn enums_retry_with_tag_prefix() {
    let s = rom_session();
    let mode = s.get_enum("mode_t").unwrap();
    assert_eq!(mode.value("ON").unwrap(), Some(1));
    assert_eq!(mode.value("BOGUS").unwrap(), None);

    // "colour" is only present as "enum colour".
    let colour = s.get_enum("colour").unwrap();
    assert_eq!(colour.value("GREEN").unwrap(), Some(1));

    assert!(matches!(
        s.get_enum("missing"),
        Err(Error::UnknownSymbol(_))
    ));
}

#[test]
fn enumerator_constants_merge_across_readers() {
    let s = combined_session();
    assert_eq!(s.enumerator("ON"), Some(1));
    assert_eq!(s.enumerator("PATCHED"), Some(1));
    assert_eq!(s.enumerator("BOGUS"), None);
}

#[test]
fn frame_info_comes_from_the_covering_reader() {
    let s = rom_session();
    let rules = s.get_frame_info(0x1010, &RegisterSet::new()).unwrap();
    assert_eq!(rules.cfa_register, 13);
    assert!(matches!(
        s.get_frame_info(0x9000, &RegisterSet::new()),
        Err(Error::NoStackFrameInfo { pc: 0x9000 })
    ));
}

#[test]
fn stack_frames_carry_function_context() {
    let s = rom_session();
    let init = s.get_function("init").unwrap();
    let frame = init.frame_info(0x1010, true, &RegisterSet::new()).unwrap();
    assert_eq!(frame.pc(), 0x1010);
    assert_eq!(frame.rules().cfa_offset, 8);
    assert_eq!(
        frame.source_line(),
        Some(("src/main.c".to_string(), 42))
    );
    let locals = frame.locals();
    assert_eq!(locals[0].0, "tmp");
    let loc = frame.local_var_loc(&locals[0].1).unwrap();
    assert_eq!(loc[0].op, gim_con::DW_OP_reg3);
}

#[test]
fn compilation_units_gather_ranges_and_scope_lookups() {
    let s = rom_session();
    let cu = s.get_cu("main.c").unwrap();
    assert_eq!(cu.name(), "src/main.c");
    assert_eq!(cu.address().unwrap(), 0x1000);
    assert!(cu.contains(0x1234));
    assert!(!cu.contains(0x2500));

    let counter = cu.get_variable("counter").unwrap();
    assert_eq!(counter.static_location(), Some(0x4000));
    let mut names = cu.variable_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["counter".to_string(), "state".to_string()]);

    // The unit's own type namespace has only main.c's declaration of Foo.
    assert!(cu.get_type("uint16").is_ok());
    assert!(matches!(
        cu.get_type("Foo"),
        Err(Error::UndefinedType { .. })
    ));
    assert_eq!(cu.get_enum("mode_t").unwrap().value("OFF").unwrap(), Some(0));
}

#[test]
fn cu_scoped_session_lookups() {
    let s = combined_session();
    let counter = s.get_cu_variable("main.c", "counter").unwrap();
    // Routed to the patch image even through the CU-scoped path.
    assert_eq!(counter.static_location(), Some(0x8000));
    assert!(matches!(
        s.get_cu_variable("nowhere.c", "counter"),
        Err(Error::UnknownSymbol(_))
    ));
}

#[test]
fn function_lists_split_globals_and_statics() {
    let s = rom_session();
    let list = s.function_list().unwrap();
    let init = list.iter().find(|(n, _, _)| n == "init").unwrap();
    assert_eq!(init.1, None);
    let static_helper = list
        .iter()
        .find(|(n, cu, _)| n == "helper" && cu.is_some())
        .unwrap();
    assert_eq!(static_helper.1.as_deref(), Some("main.c"));

    let mut cus = s.function_cus("helper").unwrap();
    cus.sort();
    assert_eq!(cus, vec!["main.c".to_string(), "util.c".to_string()]);
}

#[test]
fn global_lists_filter_by_linkage() {
    let s = rom_session();
    let globals = s.global_variable_list().unwrap();
    // g_ticks sits in the <globals> bucket, which enumeration skips; the
    // only enumerable variables are main.c's statics.
    assert!(globals.is_empty());

    let funcs = s.global_function_list().unwrap();
    let names: Vec<_> = funcs.iter().map(|(k, _)| k.join("::")).collect();
    assert!(names.contains(&"main.c::init".to_string()));
    assert!(names.contains(&"util.c::helper".to_string()));
    assert!(!names.contains(&"main.c::helper".to_string()));

    let locals = s.lookup_local_variables("state").unwrap();
    assert_eq!(locals, vec![vec!["main.c".to_string(), "state".to_string()]]);
}

#[test]
fn combining_a_combined_session_is_rejected() {
    let multi = Session::new(vec![rom(), patch()], Default::default());
    // Force the category so its provenance is visibly non-trivial.
    assert!(multi.get_variable("counter").is_ok());
    match Session::combine(vec![multi]) {
        Err(Error::StructuralMerge(_)) => {}
        other => panic!("expected StructuralMerge, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn multi_reader_sessions_still_route_correctly() {
    // Readers merged directly inside one session behave like a combined
    // session for lookups.
    let s = Session::new(vec![rom(), patch()], Default::default());
    let counter = s.get_variable("counter").unwrap();
    assert_eq!(counter.static_location(), Some(0x8000));
    let ticks = s.get_variable("g_ticks").unwrap();
    assert_eq!(ticks.static_location(), Some(0x4100));
}

#[test]
fn name_filters_drop_symbols_during_merge() {
    let filters = romdb::NameFilters {
        variables: Some(Box::new(|name: &str| name != "state")),
        ..Default::default()
    };
    let s = Session::new(vec![rom()], filters);
    assert!(s.get_variable("counter").is_ok());
    assert!(matches!(
        s.get_variable("state"),
        Err(Error::UnknownSymbol(_))
    ));
}
