//! Execution tests: compiled modules run under wasmi against stub host
//! imports that record channel traffic, persisted state and series storage.

use std::collections::HashMap;

use rill_codegen::compile;
use rill_types::ast::*;
use rill_types::{Analysis, AstBuilder, Span, Symbol, SymbolKind, Type};
use wasmi::{Caller, Engine, Instance, Linker, Module, Store};

// ══════════════════════════════════════════════════════════════════════════════
// Host stubs
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Host {
    channels: HashMap<i32, f64>,
    channel_reads: u32,
    writes: Vec<(i32, f64)>,
    state: HashMap<(i32, i32), i64>,
    series: Vec<Vec<i64>>,
}

fn instantiate(wasm: &[u8], host: Host) -> (Store<Host>, Instance) {
    let engine = Engine::default();
    let module = Module::new(&engine, wasm).expect("failed to parse wasm module");
    let mut store = Store::new(&engine, host);
    let mut linker = Linker::<Host>::new(&engine);

    linker
        .func_wrap(
            "env",
            "channel_read_f64",
            |mut caller: Caller<'_, Host>, key: i32| -> f64 {
                let host = caller.data_mut();
                host.channel_reads += 1;
                host.channels.get(&key).copied().unwrap_or_default()
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "channel_write_f64",
            |mut caller: Caller<'_, Host>, key: i32, value: f64| {
                caller.data_mut().writes.push((key, value));
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "state_load_i64",
            |mut caller: Caller<'_, Host>, owner: i32, slot: i32, init: i64| -> i64 {
                *caller.data_mut().state.entry((owner, slot)).or_insert(init)
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "state_store_i64",
            |mut caller: Caller<'_, Host>, owner: i32, slot: i32, value: i64| {
                caller.data_mut().state.insert((owner, slot), value);
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "series_create_empty_i64",
            |mut caller: Caller<'_, Host>, len: i32| -> i32 {
                let series = &mut caller.data_mut().series;
                series.push(vec![0; len as usize]);
                (series.len() - 1) as i32
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "series_set_element_i64",
            |mut caller: Caller<'_, Host>, handle: i32, index: i32, value: i64| -> i32 {
                caller.data_mut().series[handle as usize][index as usize] = value;
                handle
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "series_index_i64",
            |caller: Caller<'_, Host>, handle: i32, index: i32| -> i64 {
                caller.data().series[handle as usize][index as usize]
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "series_len",
            |caller: Caller<'_, Host>, handle: i32| -> i64 {
                caller.data().series[handle as usize].len() as i64
            },
        )
        .unwrap();
    linker
        .func_wrap(
            "env",
            "math_pow_f64",
            |_: Caller<'_, Host>, base: f64, exponent: f64| -> f64 { base.powf(exponent) },
        )
        .unwrap();
    linker
        .func_wrap("env", "now", |_: Caller<'_, Host>| -> i64 { 1_000 })
        .unwrap();

    let instance = linker
        .instantiate(&mut store, &module)
        .expect("failed to instantiate")
        .start(&mut store)
        .expect("failed to start instance");
    (store, instance)
}

/// Module-level scope with `f64` channels at the given keys.
fn with_channels(list: &[(&str, u32)]) -> Analysis {
    let mut analysis = Analysis::default();
    let root = analysis.scope.root();
    for (name, key) in list {
        analysis
            .scope
            .declare_with_id(
                root,
                Symbol {
                    name: name.to_string(),
                    kind: SymbolKind::Channel,
                    ty: Type::chan(Type::F64),
                    id: *key,
                },
            )
            .unwrap();
    }
    analysis
}

fn build(items: Vec<Item>, analysis: &Analysis) -> Vec<u8> {
    compile(&Program::new(items), analysis)
        .unwrap_or_else(|e| panic!("codegen failed: {e}"))
        .wasm
}

fn run(items: Vec<Item>) -> (Store<Host>, Instance) {
    let wasm = build(items, &Analysis::default());
    instantiate(&wasm, Host::default())
}

fn ident(name: &str) -> Ident {
    Ident::new(name, Span::default())
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic and literals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn add_returns_sum() {
    let mut b = AstBuilder::new();
    let sum = {
        let l = b.ident("a");
        let r = b.ident("b");
        b.binary(l, BinOp::Add, r)
    };
    let ret = b.ret(Some(sum));
    let add = b.function(
        "add",
        vec![Param::new("a", Type::I32), Param::new("b", Type::I32)],
        Outputs::Single(Type::I32),
        vec![ret],
    );

    let ten = b.int(10);
    let ten = b.cast(Type::I32, ten);
    let twenty = b.int(20);
    let twenty = b.cast(Type::I32, twenty);
    let constant = b.binary(ten, BinOp::Add, twenty);
    let ret = b.ret(Some(constant));
    let thirty = b.function("thirty", vec![], Outputs::Single(Type::I32), vec![ret]);

    let (mut store, instance) = run(vec![add, thirty]);
    let add = instance
        .get_typed_func::<(i32, i32), i32>(&store, "add")
        .unwrap();
    assert_eq!(add.call(&mut store, (10, 20)).unwrap(), 30);
    let thirty = instance.get_typed_func::<(), i32>(&store, "thirty").unwrap();
    assert_eq!(thirty.call(&mut store, ()).unwrap(), 30);
}

#[test]
fn int_literal_becomes_float_beside_float_variable() {
    let mut b = AstBuilder::new();
    let x = b.ident("x");
    let one = b.int(1);
    let sum = b.binary(x, BinOp::Add, one);
    let ret = b.ret(Some(sum));
    let grow = b.function(
        "grow",
        vec![Param::new("x", Type::F32)],
        Outputs::Single(Type::F32),
        vec![ret],
    );

    let (mut store, instance) = run(vec![grow]);
    let grow = instance.get_typed_func::<f32, f32>(&store, "grow").unwrap();
    assert_eq!(grow.call(&mut store, 1.5).unwrap(), 2.5);
}

#[test]
fn narrow_return_truncates_literal() {
    let mut b = AstBuilder::new();
    let big = b.int(300);
    let ret = b.ret(Some(big));
    let wrap = b.function("wrap", vec![], Outputs::Single(Type::U8), vec![ret]);

    let (mut store, instance) = run(vec![wrap]);
    let wrap = instance.get_typed_func::<(), i32>(&store, "wrap").unwrap();
    assert_eq!(wrap.call(&mut store, ()).unwrap(), 44);
}

#[test]
fn unsigned_comparison() {
    let mut b = AstBuilder::new();
    let a = b.ident("a");
    let c = b.ident("c");
    let gt = b.binary(a, BinOp::Gt, c);
    let ret = b.ret(Some(gt));
    let f = b.function(
        "gt",
        vec![Param::new("a", Type::U32), Param::new("c", Type::U32)],
        Outputs::Single(Type::BOOL),
        vec![ret],
    );

    let (mut store, instance) = run(vec![f]);
    let gt = instance.get_typed_func::<(i32, i32), i32>(&store, "gt").unwrap();
    // 0xFFFF_FFFF as u32 is larger than 1.
    assert_eq!(gt.call(&mut store, (-1, 1)).unwrap(), 1);
}

#[test]
fn cast_round_trip_preserves_value() {
    let mut b = AstBuilder::new();
    let x = b.ident("x");
    let wide = b.cast(Type::F64, x);
    let back = b.cast(Type::I32, wide);
    let ret = b.ret(Some(back));
    let f = b.function(
        "round_trip",
        vec![Param::new("x", Type::I32)],
        Outputs::Single(Type::I32),
        vec![ret],
    );

    let (mut store, instance) = run(vec![f]);
    let f = instance
        .get_typed_func::<i32, i32>(&store, "round_trip")
        .unwrap();
    for v in [0, 123_456, -98_765, i32::MAX] {
        assert_eq!(f.call(&mut store, v).unwrap(), v);
    }
}

#[test]
fn power_calls_host() {
    let mut b = AstBuilder::new();
    let x = b.ident("x");
    let two = b.float(2.0);
    let sq = b.pow(x, two);
    let ret = b.ret(Some(sq));
    let f = b.function(
        "square",
        vec![Param::new("x", Type::F64)],
        Outputs::Single(Type::F64),
        vec![ret],
    );

    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<f64, f64>(&store, "square").unwrap();
    assert_eq!(f.call(&mut store, 3.0).unwrap(), 9.0);
}

#[test]
fn fallthrough_returns_zero() {
    let mut b = AstBuilder::new();
    let f = b.function("nothing", vec![], Outputs::Single(Type::I64), vec![]);
    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<(), i64>(&store, "nothing").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 0);
}

#[test]
fn calls_may_target_later_functions() {
    let mut b = AstBuilder::new();
    let inner = {
        let x = b.ident("x");
        b.call("twice", vec![x])
    };
    let outer = b.call("twice", vec![inner]);
    let ret = b.ret(Some(outer));
    let quad = b.function(
        "quad",
        vec![Param::new("x", Type::I64)],
        Outputs::Single(Type::I64),
        vec![ret],
    );
    let doubled = {
        let x = b.ident("x");
        let two = b.int(2);
        b.binary(x, BinOp::Mul, two)
    };
    let ret = b.ret(Some(doubled));
    let twice = b.function(
        "twice",
        vec![Param::new("x", Type::I64)],
        Outputs::Single(Type::I64),
        vec![ret],
    );

    let (mut store, instance) = run(vec![quad, twice]);
    let quad = instance.get_typed_func::<i64, i64>(&store, "quad").unwrap();
    assert_eq!(quad.call(&mut store, 5).unwrap(), 20);
}

#[test]
fn config_values_bind_before_parameters() {
    let mut b = AstBuilder::new();
    let factor = b.ident("factor");
    let x = b.ident("x");
    let x = b.cast(Type::F64, x);
    let product = b.binary(factor, BinOp::Mul, x);
    let ret = b.ret(Some(product));
    let mut scale = b.function(
        "scale",
        vec![Param::new("x", Type::I32)],
        Outputs::Single(Type::F64),
        vec![ret],
    );
    if let Item::Function(decl) = &mut scale {
        decl.config = vec![Param::new("factor", Type::F64)];
    }

    let (mut store, instance) = run(vec![scale]);
    let scale = instance
        .get_typed_func::<(f64, i32), f64>(&store, "scale")
        .unwrap();
    assert_eq!(scale.call(&mut store, (2.0, 3)).unwrap(), 6.0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Short-circuit evaluation
// ══════════════════════════════════════════════════════════════════════════════

/// `d <op> 0 <logic> 10 / d > 1`
fn guarded_division(b: &mut AstBuilder, name: &str, test: BinOp, and: bool) -> Item {
    let d = b.ident("d");
    let zero = b.int(0);
    let guard = b.binary(d, test, zero);
    let ten = b.int(10);
    let d = b.ident("d");
    let quotient = b.binary(ten, BinOp::Div, d);
    let one = b.int(1);
    let check = b.binary(quotient, BinOp::Gt, one);
    let logic = if and {
        b.and(vec![guard, check])
    } else {
        b.or(vec![guard, check])
    };
    let ret = b.ret(Some(logic));
    b.function(
        name,
        vec![Param::new("d", Type::I32)],
        Outputs::Single(Type::BOOL),
        vec![ret],
    )
}

#[test]
fn short_circuit_skips_division_by_zero() {
    let mut b = AstBuilder::new();
    let safe = guarded_division(&mut b, "safe", BinOp::Ne, true);
    let either = guarded_division(&mut b, "either", BinOp::Eq, false);
    let unsafe_fn = guarded_division(&mut b, "unsafe", BinOp::Eq, true);

    let (mut store, instance) = run(vec![safe, either, unsafe_fn]);
    let safe = instance.get_typed_func::<i32, i32>(&store, "safe").unwrap();
    assert_eq!(safe.call(&mut store, 0).unwrap(), 0);
    assert_eq!(safe.call(&mut store, 2).unwrap(), 1);

    let either = instance.get_typed_func::<i32, i32>(&store, "either").unwrap();
    assert_eq!(either.call(&mut store, 0).unwrap(), 1);

    // `d == 0 && 10 / d > 1` evaluates the division when d is zero.
    let trapping = instance.get_typed_func::<i32, i32>(&store, "unsafe").unwrap();
    assert!(trapping.call(&mut store, 0).is_err());
}

#[test]
fn constant_comparisons_combine() {
    let mut b = AstBuilder::new();
    let cast_int = |b: &mut AstBuilder, v: i64| {
        let lit = b.int(v);
        b.cast(Type::I32, lit)
    };
    let five = cast_int(&mut b, 5);
    let three = cast_int(&mut b, 3);
    let ten = cast_int(&mut b, 10);
    let twenty = cast_int(&mut b, 20);
    let gt = b.binary(five, BinOp::Gt, three);
    let gt = b.paren(gt);
    let lt = b.binary(ten, BinOp::Lt, twenty);
    let lt = b.paren(lt);
    let both = b.and(vec![gt, lt]);
    let ret = b.ret(Some(both));
    let f = b.function("both", vec![], Outputs::Single(Type::BOOL), vec![ret]);

    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<(), i32>(&store, "both").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 1);
}

#[test]
fn skipped_operand_does_not_read_channel() {
    let mut b = AstBuilder::new();
    let guarded = |b: &mut AstBuilder, name: &str, first: bool, and: bool| {
        let lit = b.boolean(first);
        let sensor = b.ident("sensor");
        let one = b.float(1.0);
        let cmp = b.binary(sensor, BinOp::Gt, one);
        let logic = if and {
            b.and(vec![lit, cmp])
        } else {
            b.or(vec![lit, cmp])
        };
        let ret = b.ret(Some(logic));
        b.function(name, vec![], Outputs::Single(Type::BOOL), vec![ret])
    };
    let false_and = guarded(&mut b, "false_and", false, true);
    let true_or = guarded(&mut b, "true_or", true, false);
    let true_and = guarded(&mut b, "true_and", true, true);

    let analysis = with_channels(&[("sensor", 1)]);
    let wasm = build(vec![false_and, true_or, true_and], &analysis);
    let mut host = Host::default();
    host.channels.insert(1, 2.0);
    let (mut store, instance) = instantiate(&wasm, host);

    let f = instance.get_typed_func::<(), i32>(&store, "false_and").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 0);
    let f = instance.get_typed_func::<(), i32>(&store, "true_or").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 1);
    assert_eq!(store.data().channel_reads, 0);

    let f = instance.get_typed_func::<(), i32>(&store, "true_and").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 1);
    assert_eq!(store.data().channel_reads, 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn range_loop_accumulates() {
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let sum = b.var("sum", zero);
    let zero = b.int(0);
    let iterations = b.var("iterations", zero);
    let i = b.ident("i");
    let add = b.assign("sum", AssignOp::Add, i);
    let one = b.int(1);
    let count = b.assign("iterations", AssignOp::Add, one);
    let start = b.int(0);
    let end = b.int(5);
    let lp = b.range("i", Some(start), end, None, vec![add, count]);
    let result = {
        let s = b.ident("sum");
        let hundred = b.int(100);
        let scaled = b.binary(s, BinOp::Mul, hundred);
        let n = b.ident("iterations");
        b.binary(scaled, BinOp::Add, n)
    };
    let ret = b.ret(Some(result));
    let f = b.function(
        "sum_to",
        vec![],
        Outputs::Single(Type::I64),
        vec![sum, iterations, lp, ret],
    );

    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<(), i64>(&store, "sum_to").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 10 * 100 + 5);
}

#[test]
fn range_loop_with_runtime_step() {
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let total = b.var("total", zero);
    let i = b.ident("i");
    let add = b.assign("total", AssignOp::Add, i);
    let start = b.ident("a");
    let end = b.ident("z");
    let step = b.ident("s");
    let lp = b.range("i", Some(start), end, Some(step), vec![add]);
    let t = b.ident("total");
    let ret = b.ret(Some(t));
    let f = b.function(
        "stepped",
        vec![
            Param::new("a", Type::I64),
            Param::new("z", Type::I64),
            Param::new("s", Type::I64),
        ],
        Outputs::Single(Type::I64),
        vec![total, lp, ret],
    );

    let (mut store, instance) = run(vec![f]);
    let f = instance
        .get_typed_func::<(i64, i64, i64), i64>(&store, "stepped")
        .unwrap();
    assert_eq!(f.call(&mut store, (0, 10, 3)).unwrap(), 18);
    assert_eq!(f.call(&mut store, (10, 0, -2)).unwrap(), 30);
    assert_eq!(f.call(&mut store, (0, 0, 1)).unwrap(), 0);
}

#[test]
fn while_loop_counts_down() {
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let steps = b.var("steps", zero);
    let n = b.ident("n");
    let zero = b.int(0);
    let cond = b.binary(n, BinOp::Gt, zero);
    let one = b.int(1);
    let dec = b.assign("n", AssignOp::Sub, one);
    let one = b.int(1);
    let inc = b.assign("steps", AssignOp::Add, one);
    let lp = b.loop_stmt(LoopKind::While(cond), vec![dec, inc]);
    let s = b.ident("steps");
    let ret = b.ret(Some(s));
    let f = b.function(
        "countdown",
        vec![Param::new("n", Type::I64)],
        Outputs::Single(Type::I64),
        vec![steps, lp, ret],
    );

    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<i64, i64>(&store, "countdown").unwrap();
    assert_eq!(f.call(&mut store, 7).unwrap(), 7);
    assert_eq!(f.call(&mut store, -3).unwrap(), 0);
}

#[test]
fn forever_loop_with_break_and_continue() {
    // i := 0; total := 0
    // loop { i += 1; if i > 10 { break }; if i % 2 == 0 { continue }; total += i }
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let i = b.var("i", zero);
    let zero = b.int(0);
    let total = b.var("total", zero);

    let one = b.int(1);
    let inc = b.assign("i", AssignOp::Add, one);
    let stop = {
        let i = b.ident("i");
        let ten = b.int(10);
        let cond = b.binary(i, BinOp::Gt, ten);
        b.if_else(cond, vec![Stmt::Break(Span::default())], vec![], None)
    };
    let skip_even = {
        let i = b.ident("i");
        let two = b.int(2);
        let rem = b.binary(i, BinOp::Rem, two);
        let zero = b.int(0);
        let cond = b.binary(rem, BinOp::Eq, zero);
        b.if_else(cond, vec![Stmt::Continue(Span::default())], vec![], None)
    };
    let i_now = b.ident("i");
    let add = b.assign("total", AssignOp::Add, i_now);
    let lp = b.loop_stmt(LoopKind::Forever, vec![inc, stop, skip_even, add]);
    let t = b.ident("total");
    let ret = b.ret(Some(t));
    let f = b.function(
        "odd_sum",
        vec![],
        Outputs::Single(Type::I64),
        vec![i, total, lp, ret],
    );

    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<(), i64>(&store, "odd_sum").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 1 + 3 + 5 + 7 + 9);
}

#[test]
fn each_loop_visits_elements_with_index() {
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let t = b.var("t", zero);
    let product = {
        let v = b.ident("v");
        let idx = b.ident("idx");
        b.binary(v, BinOp::Mul, idx)
    };
    let add = b.assign("t", AssignOp::Add, product);
    let seq = b.ident("s");
    let lp = b.loop_stmt(
        LoopKind::Each {
            index: Some(ident("idx")),
            item: ident("v"),
            seq,
        },
        vec![add],
    );
    let result = b.ident("t");
    let ret = b.ret(Some(result));
    let f = b.function(
        "weighted",
        vec![Param::new("s", Type::series(Type::I64))],
        Outputs::Single(Type::I64),
        vec![t, lp, ret],
    );

    let wasm = build(vec![f], &Analysis::default());
    let host = Host {
        series: vec![vec![4, 5, 6]],
        ..Host::default()
    };
    let (mut store, instance) = instantiate(&wasm, host);
    let f = instance.get_typed_func::<i32, i64>(&store, "weighted").unwrap();
    assert_eq!(f.call(&mut store, 0).unwrap(), 5 + 2 * 6);
}

#[test]
fn series_literal_length_and_index() {
    let mut b = AstBuilder::new();
    let elems = vec![b.int(7), b.int(8), b.int(9)];
    let lit = b.series(elems);
    let decl = b.var("s", lit);
    let s = b.ident("s");
    let len = b.call("len", vec![s]);
    let s = b.ident("s");
    let one = b.int(1);
    let second = b.index(s, one);
    let sum = b.binary(len, BinOp::Add, second);
    let ret = b.ret(Some(sum));
    let f = b.function("pick", vec![], Outputs::Single(Type::I64), vec![decl, ret]);

    let (mut store, instance) = run(vec![f]);
    let f = instance.get_typed_func::<(), i64>(&store, "pick").unwrap();
    assert_eq!(f.call(&mut store, ()).unwrap(), 3 + 8);
    assert_eq!(store.data().series, vec![vec![7, 8, 9]]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Outputs, state and channels
// ══════════════════════════════════════════════════════════════════════════════

fn read_u64(data: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(data[at..at + 8].try_into().unwrap())
}

#[test]
fn outputs_mark_dirty_bits_per_activation() {
    // split(x f64) -> (lo i32, hi f64) { lo = i32(x); if x > 10.0 { hi = x * 2.0 } }
    let mut b = AstBuilder::new();
    let x = b.ident("x");
    let truncated = b.cast(Type::I32, x);
    let set_lo = b.assign("lo", AssignOp::Set, truncated);
    let x = b.ident("x");
    let ten = b.float(10.0);
    let cond = b.binary(x, BinOp::Gt, ten);
    let x = b.ident("x");
    let two = b.float(2.0);
    let doubled = b.binary(x, BinOp::Mul, two);
    let set_hi = b.assign("hi", AssignOp::Set, doubled);
    let branch = b.if_else(cond, vec![set_hi], vec![], None);
    let f = b.function(
        "split",
        vec![Param::new("x", Type::F64)],
        Outputs::Named(vec![
            Param::new("lo", Type::I32),
            Param::new("hi", Type::F64),
        ]),
        vec![set_lo, branch],
    );

    let (mut store, instance) = run(vec![f]);
    let split = instance.get_typed_func::<f64, ()>(&store, "split").unwrap();
    let memory = instance.get_memory(&store, "memory").expect("memory export");

    split.call(&mut store, 20.0).unwrap();
    let data = memory.data(&store);
    assert_eq!(read_u64(data, 0x1000), 0b11);
    assert_eq!(i32::from_le_bytes(data[0x1008..0x100C].try_into().unwrap()), 20);
    assert_eq!(f64::from_le_bytes(data[0x100C..0x1014].try_into().unwrap()), 40.0);

    split.call(&mut store, 3.5).unwrap();
    let data = memory.data(&store);
    assert_eq!(read_u64(data, 0x1000), 0b01);
    assert_eq!(i32::from_le_bytes(data[0x1008..0x100C].try_into().unwrap()), 3);
}

#[test]
fn stateful_variable_persists_across_activations() {
    let mut b = AstBuilder::new();
    let first = b.function("first", vec![], Outputs::None, vec![]);
    let zero = b.int(0);
    let decl = b.stateful("n", Some(Type::I64), zero);
    let one = b.int(1);
    let bump = b.assign("n", AssignOp::Add, one);
    let n = b.ident("n");
    let ret = b.ret(Some(n));
    let tick = b.function(
        "tick",
        vec![],
        Outputs::Single(Type::I64),
        vec![decl, bump, ret],
    );

    let (mut store, instance) = run(vec![first, tick]);
    let tick = instance.get_typed_func::<(), i64>(&store, "tick").unwrap();
    assert_eq!(tick.call(&mut store, ()).unwrap(), 1);
    assert_eq!(tick.call(&mut store, ()).unwrap(), 2);
    assert_eq!(tick.call(&mut store, ()).unwrap(), 3);
    // Owner is the function's position in the module.
    assert_eq!(store.data().state.get(&(1, 0)), Some(&3));
}

#[test]
fn stateful_initializer_sees_outer_variable() {
    let mut b = AstBuilder::new();
    let five = b.int(5);
    let outer = b.typed_var("x", Type::I64, five);
    let init = {
        let x = b.ident("x");
        let one = b.int(1);
        b.binary(x, BinOp::Add, one)
    };
    let inner = b.stateful("x", Some(Type::I64), init);
    let x = b.ident("x");
    let ret = b.ret(Some(x));
    let yes = b.boolean(true);
    let guard = b.if_else(yes, vec![inner, ret], vec![], None);
    let zero = b.int(0);
    let fallback = b.ret(Some(zero));
    let seed = b.function(
        "seed",
        vec![],
        Outputs::Single(Type::I64),
        vec![outer, guard, fallback],
    );

    let (mut store, instance) = run(vec![seed]);
    let seed = instance.get_typed_func::<(), i64>(&store, "seed").unwrap();
    assert_eq!(seed.call(&mut store, ()).unwrap(), 6);
    // Seeded once, then read back.
    assert_eq!(seed.call(&mut store, ()).unwrap(), 6);
    assert_eq!(store.data().state.get(&(0, 1)), Some(&6));
}

#[test]
fn omitted_arguments_use_defaults() {
    let mut b = AstBuilder::new();
    let product = {
        let x = b.ident("x");
        let k = b.ident("k");
        b.binary(x, BinOp::Mul, k)
    };
    let ret = b.ret(Some(product));
    let scale = b.function(
        "scale",
        vec![
            Param::new("x", Type::I64),
            Param::new("k", Type::I64).with_default(Literal::Int(3)),
        ],
        Outputs::Single(Type::I64),
        vec![ret],
    );
    let call = {
        let x = b.ident("x");
        b.call("scale", vec![x])
    };
    let ret = b.ret(Some(call));
    let triple = b.function(
        "triple",
        vec![Param::new("x", Type::I64)],
        Outputs::Single(Type::I64),
        vec![ret],
    );

    let (mut store, instance) = run(vec![scale, triple]);
    let triple = instance.get_typed_func::<i64, i64>(&store, "triple").unwrap();
    assert_eq!(triple.call(&mut store, 5).unwrap(), 15);
    // Hosts calling the export pass every argument.
    let scale = instance
        .get_typed_func::<(i64, i64), i64>(&store, "scale")
        .unwrap();
    assert_eq!(scale.call(&mut store, (5, 2)).unwrap(), 10);
}

#[test]
fn channel_relay() {
    let mut b = AstBuilder::new();
    let sensor = b.ident("sensor");
    let two = b.float(2.0);
    let doubled = b.binary(sensor, BinOp::Mul, two);
    let write = b.assign("out", AssignOp::Set, doubled);
    let relay = b.task(
        "relay",
        Trigger::Channels(vec![ident("sensor")]),
        vec![write],
    );

    let analysis = with_channels(&[("sensor", 1), ("out", 2)]);
    let wasm = build(vec![relay], &analysis);
    let mut host = Host::default();
    host.channels.insert(1, 21.0);
    let (mut store, instance) = instantiate(&wasm, host);

    let relay = instance.get_typed_func::<(), ()>(&store, "relay").unwrap();
    relay.call(&mut store, ()).unwrap();
    assert_eq!(store.data().writes, vec![(2, 42.0)]);
    assert_eq!(store.data().channel_reads, 1);
}

#[test]
fn compound_channel_assignment_reads_then_writes() {
    let mut b = AstBuilder::new();
    let half = b.float(0.5);
    let write = b.assign("level", AssignOp::Add, half);
    let f = b.function("nudge", vec![], Outputs::None, vec![write]);

    let analysis = with_channels(&[("level", 3)]);
    let wasm = build(vec![f], &analysis);
    let mut host = Host::default();
    host.channels.insert(3, 1.0);
    let (mut store, instance) = instantiate(&wasm, host);

    let f = instance.get_typed_func::<(), ()>(&store, "nudge").unwrap();
    f.call(&mut store, ()).unwrap();
    assert_eq!(store.data().writes, vec![(3, 1.5)]);
}
