//! End-to-end integration test: Phi-SCC cleanup feeding into the Belady
//! spiller and frame/SP lowering, the way a pass driver would actually chain
//! these (spec.md §2's data-flow order, minus instruction selection and
//! emission which stay out of scope).

use ssa_mid::be::{
    layout_frame, prune_sp_producers, repair_sp_ssa, simulate, sort_frame_entities, AnyDataValue,
    BeladySpiller, Liveness, NextUseOracle, Schedule, UniformFrequency,
};
use ssa_mid::ir::block::{new_block, new_phi};
use ssa_mid::ir::frame_type::{EntityKind, FrameEntity};
use ssa_mid::ir::node::{ConstAttrs, ConstValue, GenericAttrs, IncSpAttrs, Opcode};
use ssa_mid::mode::Mode;
use ssa_mid::opt::eliminate_redundant_phi_sccs;
use ssa_mid::regreq::RegisterClass;
use ssa_mid::Graph;

fn install_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")))
        .with_test_writer()
        .try_init();
}

/// A redundant Phi SCC collapses, then the Belady spiller runs cleanly over
/// what's left, then frame layout and SP simulation finalize offsets -- the
/// whole non-instruction-selection pipeline in one pass, end to end.
#[test]
fn phi_scc_then_belady_then_frame_and_sp() {
    install_tracing();

    let mut g = Graph::new();
    g.arena_mut().enable_use_edges();
    let b0 = new_block(&mut g, vec![g.start_block()]);
    let join = new_block(&mut g, vec![b0, b0]);
    let x = g.arena_mut().new_node(
        Some(b0),
        Opcode::Const(ConstAttrs { value: ConstValue::Int(7) }),
        Mode::int(32, true),
        vec![],
        Default::default(),
    );
    let phi1 = new_phi(&mut g, join, Mode::int(32, true), vec![x, x], false).unwrap();
    let phi2 = new_phi(&mut g, join, Mode::int(32, true), vec![x, phi1], false).unwrap();
    g.arena_mut().set_input(phi1, 1, phi2);
    let consumer = g.arena_mut().new_node(
        Some(join),
        Opcode::Generic(GenericAttrs { name: "use".into() }),
        Mode::int(32, true),
        vec![phi1],
        Default::default(),
    );

    let stats = eliminate_redundant_phi_sccs(&mut g).unwrap();
    assert_eq!(stats.nodes_replaced, 2);
    assert_eq!(g.arena().get(consumer).input(0), x);

    let mut schedule = Schedule::new();
    schedule.set_block(b0, vec![x]);
    schedule.set_block(join, vec![consumer]);

    let class = RegisterClass::new();
    let blocks = [b0, join];
    let liveness = Liveness::compute(&g, &blocks, &schedule, class, &AnyDataValue);
    let oracle = NextUseOracle::new(&g, &schedule, &liveness, class, &AnyDataValue, &UniformFrequency);
    let spiller = BeladySpiller::new(&g, &schedule, &liveness, oracle, &AnyDataValue, class, 1);
    let decisions = spiller.run(&blocks);
    assert!(decisions.reloads.is_empty(), "single register, single live value: no reload needed");

    let sp0 = g.start();
    let prologue = g.arena_mut().new_node(
        Some(b0),
        Opcode::IncSp(IncSpAttrs { delta: -20, align: 4 }),
        Mode::reference(),
        vec![sp0],
        Default::default(),
    );
    let mut sp_schedule = Schedule::new();
    sp_schedule.set_block(b0, vec![prologue]);
    repair_sp_ssa(&mut g, &[b0], &sp_schedule, sp0);
    let end_state = simulate(&mut g, &[b0], &sp_schedule, 0, |_, _, offset| offset);
    let (offset, bias) = end_state[&b0];
    assert_eq!(offset, -32); // -20 rounded down to the nearest multiple of 16
    assert_eq!(bias, offset);
    prune_sp_producers(&mut g, &[prologue]);
    assert!(g.arena().is_live(prologue));

    let mut frame = g.frame.clone();
    frame.push(FrameEntity::new(0, EntityKind::SpillSlot, 4, 4));
    frame.push(FrameEntity::new(1, EntityKind::Regular, 8, 8));
    sort_frame_entities(&mut frame, true);
    layout_frame(&mut frame, 0, 0);
    assert!(frame.fixed);
    assert!(frame.members.iter().all(|m| m.has_offset()));
}
