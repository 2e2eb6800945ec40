use isofield::{
    context::Node,
    eval::TapeType,
    var::Var,
    Context, Evaluator,
};

use approx::assert_relative_eq;
use nalgebra::Vector3;
use std::collections::{BTreeSet, HashMap};

fn point(x: f32, y: f32, z: f32) -> Vector3<f32> {
    Vector3::new(x, y, z)
}

fn evaluator(ctx: &Context, root: Node) -> Evaluator {
    Evaluator::new(ctx, root, &HashMap::new()).unwrap()
}

/// Builds `sqrt(x^2 + y^2 + z^2) - r`
fn sphere(ctx: &mut Context, r: f64) -> Node {
    let x = ctx.x();
    let y = ctx.y();
    let z = ctx.z();
    let x2 = ctx.square(x).unwrap();
    let y2 = ctx.square(y).unwrap();
    let z2 = ctx.square(z).unwrap();
    let s = ctx.add(x2, y2).unwrap();
    let s = ctx.add(s, z2).unwrap();
    let s = ctx.sqrt(s).unwrap();
    ctx.sub(s, r).unwrap()
}

/// Builds a 2D ring: `max(r^2 - 0.5, 0.25 - r^2)`
fn ring(ctx: &mut Context) -> Node {
    let x = ctx.x();
    let y = ctx.y();
    let x2 = ctx.square(x).unwrap();
    let y2 = ctx.square(y).unwrap();
    let r2 = ctx.add(x2, y2).unwrap();
    let outer = ctx.sub(r2, 0.5).unwrap();
    let inner = ctx.sub(0.25, r2).unwrap();
    ctx.max(outer, inner).unwrap()
}

////////////////////////////////////////////////////////////////////////////////
// Scenarios with literal inputs

#[test]
fn test_single_axis() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let mut e = evaluator(&ctx, x);

    assert_eq!(e.eval(point(2.0, 0.0, 0.0)), 2.0);

    e.set(point(2.0, 0.0, 0.0), 0);
    let d = e.derivs(1);
    assert_eq!((d.dx[0], d.dy[0], d.dz[0]), (1.0, 0.0, 0.0));

    let i = e.eval_interval(point(0.0, 0.0, 0.0), point(1.0, 1.0, 1.0));
    assert_eq!((i.lower(), i.upper()), (0.0, 1.0));
}

#[test]
fn test_corner_features() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let y = ctx.y();
    let max = ctx.max(x, y).unwrap();
    let mut e = evaluator(&ctx, max);

    assert!(e.is_ambiguous_at(point(0.0, 0.0, 0.0)));
    assert!(!e.is_ambiguous_at(point(1.0, 0.0, 0.0)));

    let fs = e.features_at(point(0.0, 0.0, 0.0));
    assert_eq!(fs.len(), 2);
    let grads: BTreeSet<_> = fs
        .iter()
        .map(|f| (f.deriv.x as i8, f.deriv.y as i8, f.deriv.z as i8))
        .collect();
    assert_eq!(grads, [(1, 0, 0), (0, 1, 0)].into_iter().collect());

    // The corner of the intersection of two half-planes only ever grows
    // when we move away from it
    assert!(!e.is_inside(point(0.0, 0.0, 0.0)));
    assert!(e.is_inside(point(-1.0, -1.0, 0.0)));
    assert!(!e.is_inside(point(1.0, -1.0, 0.0)));
}

#[test]
fn test_slab() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let one_minus_x = ctx.sub(1.0, x).unwrap();
    let slab = ctx.min(x, one_minus_x).unwrap();
    let mut e = evaluator(&ctx, slab);

    assert_eq!(e.eval(point(0.5, 0.0, 0.0)), 0.5);

    // The computed interval must contain the true range [0, 0.5]
    let i = e.eval_interval(point(0.0, 0.0, 0.0), point(1.0, 1.0, 1.0));
    assert!(i.lower() <= 0.0);
    assert!(i.upper() >= 0.5);
    assert_eq!((i.lower(), i.upper()), (0.0, 1.0));
}

#[test]
fn test_sphere_push_preserves_everything() {
    let mut ctx = Context::new();
    let s = sphere(&mut ctx, 1.0);
    let mut e = evaluator(&ctx, s);

    assert_eq!(e.eval(point(1.0, 0.0, 0.0)), 0.0);

    // No min/max clauses, so a push can't elide anything
    let len = e.tape_len();
    e.eval_interval(point(0.9, 0.9, 0.9), point(1.1, 1.1, 1.1));
    e.push();
    assert_eq!(e.tape_len(), len);

    e.set(point(1.0, 0.0, 0.0), 0);
    let d = e.derivs(1);
    assert_eq!(d.dx[0], 1.0);
    assert_eq!(d.dy[0], 0.0);
    assert_eq!(d.dz[0], 0.0);
    e.pop();
}

#[test]
fn test_free_variable() {
    let mut ctx = Context::new();
    let v = Var::new();
    let n = ctx.var(v);
    let x = ctx.x();
    let prod = ctx.mul(x, n).unwrap();

    let vs = [(v, 3.0)].into_iter().collect();
    let mut e = Evaluator::new(&ctx, prod, &vs).unwrap();
    assert_eq!(e.eval(point(2.0, 0.0, 0.0)), 6.0);

    let g = e.gradient(point(2.0, 0.0, 0.0));
    assert_eq!(g.len(), 1);
    assert_eq!(g[&v], 2.0);

    e.set_var(v, 5.0);
    assert_eq!(e.eval(point(2.0, 0.0, 0.0)), 10.0);
}

#[test]
fn test_three_way_corner_features() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let y = ctx.y();
    let z = ctx.z();
    let min = ctx.min(x, y).unwrap();
    let max = ctx.max(min, z).unwrap();
    let mut e = evaluator(&ctx, max);

    let fs = e.features_at(point(0.0, 0.0, 0.0));
    assert_eq!(fs.len(), 3);

    let grads: BTreeSet<_> = fs
        .iter()
        .map(|f| (f.deriv.x as i8, f.deriv.y as i8, f.deriv.z as i8))
        .collect();
    assert_eq!(
        grads,
        [(1, 0, 0), (0, 1, 0), (0, 0, 1)].into_iter().collect()
    );

    // Features are pairwise distinct by choice set
    let choice_sets: BTreeSet<_> =
        fs.iter().map(|f| f.choices().to_vec()).collect();
    assert_eq!(choice_sets.len(), fs.len());
}

////////////////////////////////////////////////////////////////////////////////
// Properties

#[test]
fn test_values_match_reference_eval() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let y = ctx.y();
    let z = ctx.z();

    let mut shapes = vec![sphere(&mut ctx, 1.0), ring(&mut ctx)];
    {
        let s = ctx.sin(x).unwrap();
        let e = ctx.exp(y).unwrap();
        let p = ctx.mul(s, e).unwrap();
        let q = ctx.square(z).unwrap();
        shapes.push(ctx.add(p, q).unwrap());
    }
    {
        let a = ctx.atan2(y, x).unwrap();
        let m = ctx.modulo(a, 2.0).unwrap();
        shapes.push(ctx.min(m, z).unwrap());
    }

    let pts = [
        (0.0, 0.0, 0.0),
        (0.5, -0.25, 1.0),
        (1.0, 2.0, -3.0),
        (-0.75, 0.1, 0.6),
    ];
    for root in shapes {
        let mut e = evaluator(&ctx, root);
        for (x, y, z) in pts {
            let expected =
                ctx.eval_xyz(root, x as f64, y as f64, z as f64).unwrap();
            let actual = e.eval(point(x, y, z));
            assert_relative_eq!(
                actual,
                expected as f32,
                epsilon = 1e-5,
                max_relative = 1e-5
            );
        }
    }
}

#[test]
fn test_derivs_match_finite_differences() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let y = ctx.y();
    let z = ctx.z();

    // A smooth expression exercising most of the opcode set
    let s = ctx.sin(x).unwrap();
    let e = ctx.exp(y).unwrap();
    let p = ctx.mul(s, e).unwrap();
    let z2 = ctx.square(z).unwrap();
    let sum = ctx.add(p, z2).unwrap();
    let shifted = ctx.add(sum, 4.0).unwrap();
    let root = ctx.sqrt(shifted).unwrap();

    let mut ev = evaluator(&ctx, root);
    let h = 1e-3;
    for (px, py, pz) in [(0.1, 0.2, 0.3), (-0.5, 0.4, 1.0), (1.2, -0.3, 0.7)]
    {
        let p = point(px, py, pz);
        ev.set(p, 0);
        let d = ev.derivs(1);
        let (v, dx, dy, dz) = (d.v[0], d.dx[0], d.dy[0], d.dz[0]);

        // `derivs` reports the same values as `values`
        assert_eq!(v, ev.eval(p));

        let fd_x = (ev.eval(p + Vector3::x() * h)
            - ev.eval(p - Vector3::x() * h))
            / (2.0 * h);
        let fd_y = (ev.eval(p + Vector3::y() * h)
            - ev.eval(p - Vector3::y() * h))
            / (2.0 * h);
        let fd_z = (ev.eval(p + Vector3::z() * h)
            - ev.eval(p - Vector3::z() * h))
            / (2.0 * h);

        assert_relative_eq!(dx, fd_x, epsilon = 1e-2);
        assert_relative_eq!(dy, fd_y, epsilon = 1e-2);
        assert_relative_eq!(dz, fd_z, epsilon = 1e-2);
    }
}

#[test]
fn test_pushed_tape_is_equivalent_inside_region() {
    let mut ctx = Context::new();
    let r = ring(&mut ctx);
    let mut e = evaluator(&ctx, r);

    // A region in the upper-right quadrant, outside the inner circle, where
    // the outer branch of the max dominates
    let lower = point(0.55, 0.55, 0.0);
    let upper = point(0.8, 0.8, 0.1);
    e.eval_interval(lower, upper);
    e.push();
    assert!(e.utilization() < 1.0);

    let mut pts = Vec::new();
    for i in 0..5 {
        for j in 0..5 {
            pts.push(point(
                lower.x + (upper.x - lower.x) * i as f32 / 4.0,
                lower.y + (upper.y - lower.y) * j as f32 / 4.0,
                0.05,
            ));
        }
    }
    let reduced: Vec<f32> = pts.iter().map(|&p| e.eval(p)).collect();

    e.pop();
    for (&p, r) in pts.iter().zip(reduced) {
        assert_eq!(e.eval(p), r);
    }
}

#[test]
fn test_push_pop_is_identity() {
    let mut ctx = Context::new();
    let r = ring(&mut ctx);
    let mut e = evaluator(&ctx, r);

    let p = point(0.3, 0.1, 0.0);
    let before = e.eval(p);
    let len = e.tape_len();

    e.eval_interval(point(0.0, 0.0, 0.0), point(1.0, 1.0, 1.0));
    e.push();
    e.pop();

    assert_eq!(e.tape_len(), len);
    assert_eq!(e.tape_type(), TapeType::Original);
    assert_eq!(e.eval(p), before);
}

#[test]
fn test_specialize_preserves_value() {
    let mut ctx = Context::new();
    let r = ring(&mut ctx);
    let mut e = evaluator(&ctx, r);

    for (px, py) in [(0.3, 0.1), (0.8, 0.0), (0.5, 0.5)] {
        let p = point(px, py, 0.0);
        let before = e.eval(p);
        e.specialize(p);
        assert_eq!(e.eval(p), before);
        e.pop();
    }
}

#[test]
fn test_utilization_non_increasing() {
    let mut ctx = Context::new();
    let r = ring(&mut ctx);
    let mut e = evaluator(&ctx, r);

    assert_eq!(e.utilization(), 1.0);

    // Whole box: nothing can collapse for certain, but utilization must
    // not grow
    e.eval_interval(point(-1.0, -1.0, 0.0), point(1.0, 1.0, 0.1));
    e.push();
    let u1 = e.utilization();
    assert!(u1 <= 1.0);

    // Narrow box: one branch of the max dominates
    e.eval_interval(point(0.55, 0.55, 0.0), point(0.6, 0.6, 0.1));
    e.push();
    let u2 = e.utilization();
    assert!(u2 <= u1);
    assert!(u2 < 1.0);

    e.pop();
    e.pop();
}

#[test]
fn test_interval_is_sound() {
    let mut ctx = Context::new();
    let r = ring(&mut ctx);
    let mut e = evaluator(&ctx, r);

    let lower = point(-1.0, -1.0, -0.5);
    let upper = point(1.0, 1.0, 0.5);
    let i = e.eval_interval(lower, upper);

    for ix in 0..8 {
        for iy in 0..8 {
            let p = point(
                lower.x + (upper.x - lower.x) * ix as f32 / 7.0,
                lower.y + (upper.y - lower.y) * iy as f32 / 7.0,
                0.0,
            );
            let v = e.eval(p);
            assert!(
                v >= i.lower() - 1e-4 && v <= i.upper() + 1e-4,
                "eval({p:?}) = {v} outside {i:?}"
            );
        }
    }
}

#[test]
fn test_feature_halfspaces_cover_neighborhood() {
    let mut ctx = Context::new();
    let x = ctx.x();
    let y = ctx.y();
    let max = ctx.max(x, y).unwrap();
    let mut e = evaluator(&ctx, max);

    let fs = e.features_at(point(0.0, 0.0, 0.0));
    assert_eq!(fs.len(), 2);

    // Any direction off the tie plane is compatible with exactly one
    // feature
    let dirs = [
        point(0.3, -0.8, 0.2),
        point(-0.5, 0.7, -0.4),
        point(0.9, 0.2, -0.6),
        point(-0.1, -0.2, 0.95),
        point(0.4, 0.5, -0.9),
        point(-0.7, -0.6, -0.3),
    ];
    for d in dirs {
        assert_eq!(
            fs.iter().filter(|f| f.is_compatible(d)).count(),
            1,
            "direction {d:?} should pick exactly one branch"
        );
    }
}

#[test]
fn test_gradient_matches_finite_differences() {
    let mut ctx = Context::new();
    let v = Var::new();
    let w = Var::new();
    let vn = ctx.var(v);
    let wn = ctx.var(w);
    let x = ctx.x();

    // f = v*x + w^2
    let vx = ctx.mul(vn, x).unwrap();
    let w2 = ctx.square(wn).unwrap();
    let root = ctx.add(vx, w2).unwrap();

    let vs: HashMap<_, _> = [(v, 3.0), (w, -2.0)].into_iter().collect();
    let mut e = Evaluator::new(&ctx, root, &vs).unwrap();

    let p = point(2.0, 0.0, 0.0);
    let g = e.gradient(p);
    assert_eq!(g.len(), 2);
    assert_eq!(g[&v], 2.0); // x
    assert_eq!(g[&w], -4.0); // 2w

    let h = 1e-3;
    for (var, base) in [(v, 3.0f32), (w, -2.0f32)] {
        e.set_var(var, base + h);
        let hi = e.eval(p);
        e.set_var(var, base - h);
        let lo = e.eval(p);
        e.set_var(var, base);
        assert_relative_eq!(g[&var], (hi - lo) / (2.0 * h), epsilon = 1e-2);
    }
}

#[test]
fn test_const_var_freezes_gradient() {
    let mut ctx = Context::new();
    let v = Var::new();
    let vn = ctx.var(v);
    let x = ctx.x();

    // f = v*x + const_var(v): only the first term sees the variable
    let vx = ctx.mul(vn, x).unwrap();
    let frozen = ctx.const_var(vn).unwrap();
    let root = ctx.add(vx, frozen).unwrap();

    let vs = [(v, 3.0)].into_iter().collect();
    let mut e = Evaluator::new(&ctx, root, &vs).unwrap();

    assert_eq!(e.eval(point(2.0, 0.0, 0.0)), 9.0);
    let g = e.gradient(point(2.0, 0.0, 0.0));
    assert_eq!(g[&v], 2.0);
}

#[test]
fn test_var_roundtrip_reports_no_change() {
    let mut ctx = Context::new();
    let v = Var::new();
    let n = ctx.var(v);
    let x = ctx.x();
    let root = ctx.add(n, x).unwrap();

    let vs: HashMap<_, _> = [(v, 1.25)].into_iter().collect();
    let mut e = Evaluator::new(&ctx, root, &vs).unwrap();

    e.set_var(v, 1.25);
    assert!(!e.update_vars(&vs).unwrap());
    assert_eq!(e.var_values(), vs);
}
