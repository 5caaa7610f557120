//! Drives the gears end to end on the headless context.

use std::{cell::RefCell, rc::Rc};

use cgmath::{assert_abs_diff_eq, Matrix4, Vector4};
use gears::{
    gfx::{
        context::StageKind,
        headless::{HeadlessContext, TickRecorder},
    },
    Gears, GearsError,
};

fn attach(gears: &mut Gears<HeadlessContext>, ctx: HeadlessContext) {
    gears
        .attach(Box::new(TickRecorder::default()), ctx)
        .expect("built-in scene attaches");
}

fn quiet() -> Gears<HeadlessContext> {
    let mut gears = Gears::new();
    gears.set_print_callback(Some(Box::new(|_, _, _| {})));
    gears
}

#[test]
fn one_second_advances_seventy_degrees() {
    let mut gears = quiet();
    attach(&mut gears, HeadlessContext::new());

    gears.tick_at(3.0);
    gears.tick_at(4.0);
    assert_eq!(gears.angle(), 70.0);

    let rotations: Vec<f32> = gears
        .scene()
        .unwrap()
        .gears()
        .iter()
        .map(|g| g.rotation())
        .collect();
    assert_eq!(rotations, vec![70.0, -149.0, -165.0]);
}

#[test]
fn paused_animation_keeps_the_angle() {
    let mut gears = quiet();
    gears.set_animate(false);
    attach(&mut gears, HeadlessContext::new());

    gears.tick_at(0.0);
    gears.tick_at(1.0);
    assert_eq!(gears.angle(), 0.0);

    gears.set_animate(true);
    gears.tick_at(1.5);
    assert_eq!(gears.angle(), 35.0);
}

#[test]
fn each_tick_renders_one_frame() {
    let ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    let mut gears = quiet();
    gears.reshape(640, 480);
    attach(&mut gears, ctx);

    gears.tick_at(0.0);
    gears.tick_at(0.016);

    let frames = ledger.take_frames();
    assert_eq!(frames.len(), 2);
    for frame in &frames {
        assert_eq!(frame.viewport, Some((640, 480)));
        assert_eq!(frame.clear_color, Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(frame.draws.len(), 6);
    }

    gears.tick_at(0.032);
    assert_eq!(ledger.frames().len(), 1);
}

#[test]
fn transform_uniform_is_projection_view_model() {
    let ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    let mut gears = quiet();
    attach(&mut gears, ctx);
    gears.tick_at(0.0);

    let scene = gears.scene().unwrap();
    let location = scene.flat_program().uniform("u_tf").unwrap();
    let frame = ledger.last_frame().unwrap();

    let expected = gears.projection() * gears.view() * scene.gears()[0].model();
    let uploaded: [[f32; 4]; 4] = {
        let floats = frame.draws[0].floats(location);
        let mut columns = [[0.0; 4]; 4];
        for (i, column) in floats.chunks(4).enumerate() {
            columns[i].copy_from_slice(column);
        }
        columns
    };
    assert_abs_diff_eq!(Matrix4::from(uploaded), expected, epsilon = 1e-5);
}

#[test]
fn reshape_sets_frustum_and_viewport() {
    let mut gears: Gears<HeadlessContext> = quiet();
    gears.reshape(200, 100);

    let f = gears.camera().frustum();
    assert_eq!([f.left, f.right, f.bottom, f.top], [-1.0, 1.0, -0.5, 0.5]);
    assert_eq!([f.near, f.far], [5.0, 60.0]);

    // a point on the near plane at the top edge lands on the top of clip space
    let p = gears.projection() * Vector4::new(0.0, 0.5, -5.0, 1.0);
    assert_abs_diff_eq!(p.y / p.w, 1.0, epsilon = 1e-6);
}

#[test]
fn view_rotations_persist_across_attach() {
    let mut gears = quiet();
    assert_eq!(
        (gears.view_rotx(), gears.view_roty(), gears.view_rotz()),
        (20.0, 30.0, 0.0)
    );

    gears.set_view_rotz(15.0);
    attach(&mut gears, HeadlessContext::new());
    let view = gears.view();
    gears.detach();
    attach(&mut gears, HeadlessContext::new());

    assert_eq!(gears.view_rotz(), 15.0);
    assert_eq!(gears.view(), view);
}

#[test]
fn detach_is_idempotent_and_releases_once() {
    let ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    let mut gears = quiet();
    attach(&mut gears, ctx);
    gears.tick_at(0.0);

    let ctx = gears.detach();
    assert!(ctx.is_some());
    assert!(gears.detach().is_none());
    assert!(!gears.is_attached());

    assert_eq!(ledger.live_total(), 0);
    assert_eq!(ledger.double_releases(), 0);

    // ticking while detached draws nothing
    gears.tick_at(1.0);
    assert_eq!(ledger.frames().len(), 1);
}

#[test]
fn reattach_releases_the_previous_context() {
    let first = HeadlessContext::new();
    let first_ledger = first.ledger();
    let second = HeadlessContext::new();
    let second_ledger = second.ledger();

    let mut gears = quiet();
    attach(&mut gears, first);
    gears.tick_at(0.0);
    gears.tick_at(2.0);
    attach(&mut gears, second);

    assert_eq!(first_ledger.live_total(), 0);
    assert!(second_ledger.live_total() > 0);
    // angle and timing start over
    assert_eq!(gears.angle(), 0.0);
    gears.tick_at(10.0);
    assert_eq!(gears.angle(), 0.0);
}

#[test]
fn failed_attach_leaves_nothing_behind() {
    let mut ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    ctx.fail_buffer_creation_after(10);

    let errors = Rc::new(RefCell::new(Vec::new()));
    let mut gears: Gears<HeadlessContext> = Gears::new();
    let sink = errors.clone();
    gears.set_print_callback(Some(Box::new(move |head, _, err| {
        if err.is_some() {
            sink.borrow_mut().push(head.to_string());
        }
    })));

    let ticks = TickRecorder::default();
    let err = gears.attach(Box::new(ticks.clone()), ctx).unwrap_err();
    assert!(matches!(err.error, GearsError::BufferCreation { .. }));
    assert!(!gears.is_attached());
    assert_eq!(ticks.requests(), 0);
    assert_eq!(ledger.live_total(), 0);
    assert_eq!(ledger.double_releases(), 0);
    // buffer failures are returned, not printed
    assert!(errors.borrow().is_empty());
}

type Report = (String, Option<String>, bool);

fn recording(gears: &mut Gears<HeadlessContext>) -> Rc<RefCell<Vec<Report>>> {
    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = reports.clone();
    gears.set_print_callback(Some(Box::new(move |head, detail, err| {
        sink.borrow_mut()
            .push((head.to_string(), detail.map(str::to_string), err.is_some()));
    })));
    reports
}

#[test]
fn compile_failure_during_attach_is_reported_and_cleaned_up() {
    let mut ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    // flat vertex, flat fragment and smooth vertex compile; smooth fragment fails
    ctx.fail_compile_after(3);

    let mut gears = Gears::new();
    let reports = recording(&mut gears);
    let ticks = TickRecorder::default();
    let err = gears.attach(Box::new(ticks.clone()), ctx).unwrap_err();

    match &err.error {
        GearsError::ShaderCompile { kind, name, log } => {
            assert_eq!(*kind, StageKind::Fragment);
            assert_eq!(name, "smooth");
            assert!(log.contains("rejected"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    let (head, detail, has_error) = &reports[0];
    assert_eq!(head, "Error compiling fragment shader 'smooth'.");
    assert_eq!(detail.as_deref(), err.error.info_log());
    assert!(has_error);

    assert!(!gears.is_attached());
    assert_eq!(ticks.requests(), 0);
    assert_eq!(ledger.live_stages(), 0);
    assert_eq!(ledger.live_programs(), 0);
    assert_eq!(ledger.programs_created(), 1);
    assert_eq!(ledger.double_releases(), 0);
}

#[test]
fn link_failure_during_attach_is_reported_and_cleaned_up() {
    let mut ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    ctx.fail_link_after(1);

    let mut gears = Gears::new();
    let reports = recording(&mut gears);
    let ticks = TickRecorder::default();
    let err = gears.attach(Box::new(ticks.clone()), ctx).unwrap_err();

    assert!(matches!(&err.error, GearsError::ProgramLink { name, .. } if name == "smooth"));
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "Error linking shader 'smooth':");
    assert!(reports[0].1.as_deref().is_some_and(|log| log.contains("rejected")));
    assert!(reports[0].2);

    assert!(!gears.is_attached());
    assert_eq!(ticks.requests(), 0);
    assert_eq!(ledger.live_total(), 0);
    assert_eq!(ledger.programs_created(), 2);
    assert_eq!(ledger.double_releases(), 0);
}

#[test]
fn failed_attach_hands_the_context_back_for_a_retry() {
    let mut ctx = HeadlessContext::new();
    let ledger = ctx.ledger();
    ctx.fail_buffer_creation_after(0);

    let mut gears = quiet();
    let err = gears
        .attach(Box::new(TickRecorder::default()), ctx)
        .unwrap_err();
    let (error, mut ctx) = err.into_parts();
    assert!(matches!(error, GearsError::BufferCreation { .. }));
    assert_eq!(ledger.live_total(), 0);

    ctx.clear_failures();
    let ticks = TickRecorder::default();
    gears
        .attach(Box::new(ticks.clone()), ctx)
        .expect("retry on the same context");
    assert!(gears.is_attached());
    assert_eq!(ticks.requests(), 1);
    assert_eq!(ledger.live_buffers(), 18);
}
