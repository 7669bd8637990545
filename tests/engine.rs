use gauge_core::error::ScriptError;
use gauge_core::registry::TierCounts;
use gauge_core::{
    BindingContext, EngineConfig, EngineError, HostRegistry, Namespace, Panel, Tier, VariableKind,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct Sim {
    heading: Cell<f64>,
    engaged: Cell<bool>,
    n1: Cell<f64>,
    failing: Cell<bool>,
    hits: RefCell<Vec<u32>>,
}

impl Sim {
    fn hit(&self, k: f64) -> f64 {
        let mut hits = self.hits.borrow_mut();
        let i = k as usize;
        if hits.len() <= i {
            hits.resize(i + 1, 0);
        }
        hits[i] += 1;
        k
    }

    fn take_hits(&self) -> Vec<u32> {
        std::mem::take(&mut *self.hits.borrow_mut())
    }
}

fn hosts(sim: &Rc<Sim>) -> HostRegistry {
    HostRegistry::with_math_library()
        .with(
            Namespace::shared("nav", sim.clone())
                .method0("Heading", |s: &Sim| s.heading.get())
                .method0("Engaged", |s: &Sim| s.engaged.get())
                .method1("Bug", |s: &Sim, offset: f64| s.heading.get() + offset),
        )
        .with(Namespace::shared("eng", sim.clone()).method1("N1", |s: &Sim, engine: f64| {
            s.n1.get() * engine
        }))
        .with(Namespace::shared("sensor", sim.clone()).method0("Read", |s: &Sim| {
            if s.failing.get() {
                Err("sensor offline")
            } else {
                Ok(s.heading.get())
            }
        }))
        .with(Namespace::shared("counter", sim.clone()).method1("Hit", |s: &Sim, k: f64| s.hit(k)))
}

fn setup(config: EngineConfig) -> (Panel, Rc<Sim>) {
    let sim = Rc::new(Sim::default());
    sim.heading.set(45.0);
    let panel = Panel::with_config(hosts(&sim), config).unwrap();
    (panel, sim)
}

#[test]
fn test_heading_end_to_end() {
    let (mut panel, sim) = setup(EngineConfig::default());
    let heading = panel.get("nav.Heading()").unwrap();
    assert_eq!(panel[heading].kind(), VariableKind::NativeBound);
    assert_eq!(panel[heading].value(), 45.0);

    let received = Rc::new(RefCell::new(Vec::new()));
    let r = received.clone();
    panel
        .on_numeric_change(heading, move |value| {
            r.borrow_mut().push(value);
            Ok(())
        })
        .unwrap();

    sim.heading.set(90.0);
    panel.tick();
    assert_eq!(panel[heading].value(), 90.0);
    assert_eq!(*received.borrow(), vec![90.0]);

    // No further change, no further callback
    panel.tick();
    assert_eq!(*received.borrow(), vec![90.0]);
}

#[test]
fn test_equivalent_texts_share_one_variable() {
    let (mut panel, _) = setup(EngineConfig::default());
    let a = panel.get("nav.Heading()").unwrap();
    let b = panel.get("nav.Heading( )").unwrap();
    let c = panel.get("  nav . Heading ( )  ").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(panel.len(), 1);

    let d = panel.get("math.Max(nav.Heading(),1)").unwrap();
    let e = panel.get("math.Max( nav.Heading() , 1 )").unwrap();
    assert_eq!(d, e);

    let f = panel.get("'HDG' .. nav.Heading()").unwrap();
    let g = panel.get("\"HDG\"..nav.Heading()").unwrap();
    assert_eq!(f, g);
}

#[test]
fn test_zero_literals_fold_to_one_constant() {
    let (mut panel, _) = setup(EngineConfig::default());
    let ids: Vec<_> = ["0", "0.0", "0.00"]
        .iter()
        .map(|text| panel.get(text).unwrap())
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(panel.len(), 1);
    assert_eq!(panel[ids[0]].kind(), VariableKind::Constant);
    assert_eq!(panel[ids[0]].safe_value(), 0.0);
}

#[test]
fn test_native_and_fallback_agree() {
    let (mut panel, sim) = setup(EngineConfig::default());
    let pairs = [
        ("nav.Heading()", "(nav.Heading())"),
        ("nav.Bug(10)", "(nav.Bug(10))"),
        ("math.Sin(nav.Heading())", "(math.Sin(nav.Heading()))"),
        ("math.Abs(-3)", "(math.Abs(-3))"),
        ("nav.Heading() * 2 + 1", "(nav.Heading() * 2 + 1)"),
        ("nav.Heading() / -4 + nav.Bug(1)", "(nav.Heading() / -4 + nav.Bug(1))"),
        ("math.Cos(nav.Heading()) * 2 + 1", "(math.Cos(nav.Heading()) * 2 + 1)"),
        ("nav.Bug(math.Sin(nav.Heading()))", "(nav.Bug(math.Sin(nav.Heading())))"),
    ];
    let ids: Vec<_> = pairs
        .iter()
        .map(|(native, script)| (panel.get(native).unwrap(), panel.get(script).unwrap()))
        .collect();

    for heading in [45.0, 90.0, -12.5, 359.0, std::f64::consts::PI] {
        sim.heading.set(heading);
        let report = panel.tick();
        assert!(report.is_clean());
        for ((native, script), (n, s)) in pairs.iter().zip(&ids) {
            assert_eq!(panel[*n].kind(), VariableKind::NativeBound, "{}", native);
            assert_eq!(panel[*s].kind(), VariableKind::Script, "{}", script);
            assert!(
                (panel[*n].value() - panel[*s].value()).abs() < 1e-9,
                "{} vs {} at heading {}",
                native,
                script,
                heading
            );
        }
    }
}

#[test]
fn test_literal_chains_agree_with_the_interpreter() {
    let (mut panel, _) = setup(EngineConfig::default());
    for (bare, parenthesized) in [("2 * 3", "(2 * 3)"), ("1 + 8 / -4 * 3", "(1 + 8 / -4 * 3)")] {
        let a = panel.get(bare).unwrap();
        let b = panel.get(parenthesized).unwrap();
        assert_eq!(panel[a].kind(), VariableKind::Constant, "{}", bare);
        assert_eq!(panel[b].kind(), VariableKind::Constant, "{}", parenthesized);
        assert_eq!(panel[a].value(), panel[b].value());
    }
}

#[test]
fn test_bool_chains_agree_with_the_interpreter() {
    let (mut panel, sim) = setup(EngineConfig::default());
    sim.engaged.set(true);
    let bare = panel.get("nav.Engaged() * 2").unwrap();
    let parenthesized = panel.get("(nav.Engaged() * 2)").unwrap();
    // Arithmetic on a bool is a type error either way, never 1 * 2
    assert_ne!(panel[bare].kind(), VariableKind::NativeBound);
    assert!(!panel[bare].is_valid());
    assert!(!panel[parenthesized].is_valid());
    assert_eq!(panel[bare].safe_value(), panel[parenthesized].safe_value());
}

#[test]
fn test_literal_chain_folds_to_one_constant() {
    let (mut panel, _) = setup(EngineConfig::default());
    let id = panel.get("2 * 3").unwrap();
    assert_eq!(panel[id].kind(), VariableKind::Constant);
    assert_eq!(panel[id].value(), 6.0);
    assert_eq!(panel.len(), 1);
    assert_eq!(panel.tier_counts(), TierCounts::default());

    // Literal operands of a bound chain stay inside the binding
    panel.get("nav.Heading() * 2 + 1").unwrap();
    assert_eq!(panel.len(), 3);
    assert!(panel.lookup("1", &BindingContext::new()).is_none());
}

#[test]
fn test_chain_over_math_tier_is_current() {
    let (mut panel, sim) = setup(EngineConfig::default());
    let native = panel.get("math.Cos(nav.Heading()) * 2").unwrap();
    let script = panel.get("(math.Cos(nav.Heading()) * 2)").unwrap();
    assert_eq!(panel[native].kind(), VariableKind::NativeBound);
    assert_eq!(panel[native].tier(), Some(Tier::MathLibrary));

    sim.heading.set(std::f64::consts::PI);
    panel.tick();
    assert!((panel[native].value() + 2.0).abs() < 1e-9);
    assert!((panel[native].value() - panel[script].value()).abs() < 1e-9);

    // A host call over a math-tier argument is refreshed after it as well
    let bug = panel.get("nav.Bug(math.Cos(nav.Heading()))").unwrap();
    assert_eq!(panel[bug].tier(), Some(Tier::MathLibrary));
    sim.heading.set(0.0);
    panel.tick();
    assert_eq!(panel[bug].value(), 1.0);
}

#[test]
fn test_argument_without_a_value_is_not_bound() {
    let (mut panel, sim) = setup(EngineConfig::default());
    sim.failing.set(true);
    let abs = panel.get("math.Abs(sensor.Read())").unwrap();
    let sensor = panel.lookup("sensor.Read()", &BindingContext::new()).unwrap();
    assert_eq!(panel[sensor].kind(), VariableKind::NativeBound);
    assert!(!panel[sensor].has_value());
    assert_ne!(panel[abs].kind(), VariableKind::NativeBound);

    sim.failing.set(false);
    panel.tick();
    assert!(panel[sensor].has_value());
    assert_eq!(panel[sensor].value(), 45.0);

    // Once the source has produced a value it binds normally
    let sin = panel.get("math.Sin(sensor.Read())").unwrap();
    assert_eq!(panel[sin].kind(), VariableKind::NativeBound);
}

#[test]
fn test_subtracting_zero_is_its_own_expression() {
    let (mut panel, _) = setup(EngineConfig::default());
    let minus = panel.get("nav.Heading() - 0").unwrap();
    let juxtaposed = panel.get("nav.Heading() 0").unwrap();
    assert_ne!(minus, juxtaposed);
    assert_eq!(panel[minus].name(), "nav.Heading() -0");
    assert!(panel[minus].is_valid());
    assert_eq!(panel[minus].value(), 45.0);
    assert!(!panel[juxtaposed].is_valid());

    assert!(matches!(
        panel.get("nav.Bug(1e400)"),
        Err(EngineError::Unparseable { .. })
    ));
}

#[test]
fn test_math_tier_sees_this_ticks_native_values() {
    let (mut panel, sim) = setup(EngineConfig::default());
    let cos = panel.get("math.Cos(nav.Heading())").unwrap();
    assert_eq!(panel[cos].tier(), Some(Tier::MathLibrary));

    sim.heading.set(0.0);
    panel.tick();
    assert_eq!(panel[cos].value(), 1.0);
}

#[test]
fn test_numeric_callbacks_respect_tolerance() {
    let (mut panel, sim) = setup(EngineConfig::default());
    sim.heading.set(1.0);
    let heading = panel.get("nav.Heading()").unwrap();
    assert_eq!(panel[heading].value(), 1.0);

    let numeric = Rc::new(RefCell::new(Vec::new()));
    let changes = Rc::new(Cell::new(0));
    let n = numeric.clone();
    panel
        .on_numeric_change(heading, move |value| {
            n.borrow_mut().push(value);
            Ok(())
        })
        .unwrap();
    let c = changes.clone();
    panel
        .on_change(heading, move || {
            c.set(c.get() + 1);
            Ok(())
        })
        .unwrap();

    sim.heading.set(1.0 + 1e-9);
    panel.tick();
    assert!(numeric.borrow().is_empty());
    assert_eq!(changes.get(), 1);

    sim.heading.set(1.5);
    panel.tick();
    assert_eq!(*numeric.borrow(), vec![1.5]);
    assert_eq!(changes.get(), 2);
}

#[test]
fn test_script_tier_time_slicing() {
    let priority = 3;
    let (mut panel, sim) = setup(EngineConfig {
        script_update_priority: priority,
        ..EngineConfig::default()
    });
    let n = 7;
    for k in 0..n {
        let id = panel.get(&format!("(counter.Hit({}))", k)).unwrap();
        assert_eq!(panel[id].tier(), Some(Tier::Script));
    }
    // Creation evaluates each once
    assert_eq!(sim.take_hits(), vec![1; n]);

    let max_per_tick = (n + priority - 1) / priority;
    let mut total = vec![0u32; n];
    for _ in 0..priority {
        let report = panel.tick();
        assert!(report.script <= max_per_tick);
        let hits = sim.take_hits();
        assert!(hits.iter().sum::<u32>() as usize <= max_per_tick);
        for (i, count) in hits.iter().enumerate() {
            total[i] += count;
        }
    }
    assert_eq!(total, vec![1; n]);
}

#[test]
fn test_evaluation_failures_are_contained() {
    let (mut panel, sim) = setup(EngineConfig::default());
    let before = panel.get("(nav.Heading() * 1)").unwrap();
    let failing_script = panel.get("(sensor.Read())").unwrap();
    let after = panel.get("(nav.Heading() * 2)").unwrap();
    let failing_native = panel.get("sensor.Read()").unwrap();
    let native = panel.get("nav.Heading()").unwrap();
    assert_eq!(panel[failing_script].value(), 45.0);

    sim.failing.set(true);
    sim.heading.set(10.0);
    let report = panel.tick();
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().any(|err| matches!(
        err,
        EngineError::Evaluation { name, source: ScriptError::Host(_) } if name == "(sensor.Read())"
    )));

    // Failed variables keep their last value, everything else moved on
    assert_eq!(panel[failing_script].value(), 45.0);
    assert_eq!(panel[failing_native].value(), 45.0);
    assert_eq!(panel[before].value(), 10.0);
    assert_eq!(panel[after].value(), 20.0);
    assert_eq!(panel[native].value(), 10.0);

    sim.failing.set(false);
    let report = panel.tick();
    assert!(report.is_clean());
    assert_eq!(panel[failing_script].value(), 10.0);
    assert_eq!(panel[failing_native].value(), 10.0);
}

#[test]
fn test_failing_callback_does_not_stop_the_tick() {
    let (mut panel, sim) = setup(EngineConfig::default());
    let heading = panel.get("nav.Heading()").unwrap();
    let bug = panel.get("nav.Bug(5)").unwrap();
    panel
        .on_numeric_change(heading, |_| Err("gauge detached".into()))
        .unwrap();
    let seen = Rc::new(Cell::new(0.0));
    let s = seen.clone();
    panel
        .on_numeric_change(bug, move |value| {
            s.set(value);
            Ok(())
        })
        .unwrap();

    sim.heading.set(100.0);
    let report = panel.tick();
    assert!(report.is_clean());
    assert_eq!(panel[heading].value(), 100.0);
    assert_eq!(seen.get(), 105.0);
}

#[test]
fn test_binding_context_placeholders() {
    let (mut panel, sim) = setup(EngineConfig::default());
    sim.n1.set(10.0);
    let context = BindingContext::new().with("%ENGINE%", "2");
    let templated = panel.get_variable("eng.N1(%ENGINE%)", &context).unwrap();
    let literal = panel.get("eng.N1(2)").unwrap();
    assert_eq!(templated, literal);
    assert_eq!(panel[literal].value(), 20.0);
    assert_eq!(panel.lookup("eng.N1(%ENGINE%)", &context), Some(literal));
}

#[test]
fn test_tiers_rebuild_when_variables_are_added() {
    let (mut panel, _) = setup(EngineConfig::default());
    panel.get("nav.Heading()").unwrap();
    assert!(panel.tick().rebuilt);
    assert!(!panel.tick().rebuilt);

    panel.get("1").unwrap();
    assert!(!panel.tick().rebuilt);

    panel.get("(nav.Heading())").unwrap();
    let report = panel.tick();
    assert!(report.rebuilt);
    assert_eq!(report.native, 1);
    assert_eq!(report.script, 1);
    assert_eq!(
        panel.tier_counts(),
        TierCounts {
            native: 1,
            script: 1,
            math_library: 0
        }
    );
}

#[test]
fn test_unresolvable_expressions_stay_renderable() {
    let (mut panel, _) = setup(EngineConfig::default());
    let id = panel.get("nav.Altitude()").unwrap();
    assert!(!panel[id].is_valid());
    assert_eq!(panel[id].as_str(), "nav.Altitude()");
    assert_eq!(panel[id].safe_value(), 0.0);
    assert!(panel.tick().is_clean());

    assert!(matches!(
        panel.get(""),
        Err(EngineError::Unparseable { .. })
    ));
}
