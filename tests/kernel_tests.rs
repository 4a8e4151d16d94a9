use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tapegrad::backend::{Arch, default_arch, set_default_arch};
use tapegrad::error::Error;
use tapegrad::field::FieldId;
use tapegrad::gradcheck::check_gradients;
use tapegrad::kernel::{Domain, Kernel};
use tapegrad::runtime::Runtime;

fn random_vector(rt: &mut Runtime, name: &str, n: usize, rng: &mut StdRng) -> FieldId {
    let id = rt.vector(name, n, true).unwrap();
    let values: Vec<f32> = (0..n).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
    rt.copy_from_slice(id, &values).unwrap();
    id
}

#[test]
fn test_cpu_and_serial_are_identical() {
    let run = |arch| {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rt = Runtime::new(arch);
        let x = random_vector(&mut rt, "x", 257, &mut rng);
        let loss = rt.scalar("loss", true);
        let k = Kernel::over("mix", x, move |s, i| {
            let v = s.load(x, i);
            s.atomic_add(loss, 0, (v * 3.0).sin() * v.exp() - v.tanh());
        });
        rt.tape(loss, |rt| rt.launch(&k)).unwrap();
        (rt.get(loss, 0).unwrap(), rt.grad_to_vec(x).unwrap())
    };

    let (cpu_loss, cpu_grad) = run(Arch::Cpu);
    let (serial_loss, serial_grad) = run(Arch::Serial);
    assert_eq!(cpu_loss.to_bits(), serial_loss.to_bits());
    assert_eq!(cpu_grad, serial_grad);
}

#[test]
fn test_faulting_launch_writes_nothing() {
    let mut rt = Runtime::new(Arch::Cpu);
    let x = rt.vector("x", 4, false).unwrap();
    rt.copy_from_slice(x, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    // the last iteration reads past the end
    let shift = Kernel::over("shift", x, move |s, i| s.store(x, i, s.load(x, i + 1)));

    let err = rt.launch(&shift).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 4, len: 4, .. }));
    assert_eq!(rt.to_vec(x).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(rt.launch_count(), 0);
}

#[test]
fn test_reads_see_launch_snapshot() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 3, false).unwrap();
    rt.copy_from_slice(x, &[1.0, 2.0, 3.0]).unwrap();
    let rotate = Kernel::over("rotate", x, move |s, i| {
        let n = s.len(x);
        s.store(x, i, s.load(x, (i + 1) % n));
    });
    rt.launch(&rotate).unwrap();
    assert_eq!(rt.to_vec(x).unwrap(), vec![2.0, 3.0, 1.0]);
}

#[test]
fn test_field_domain_resolves_at_launch() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 5, false).unwrap();
    let count = rt.scalar("count", false);
    let k = Kernel::over("count", x, move |s, _| s.atomic_add(count, 0, s.constant(1.0)));
    assert_eq!(k.domain(), Domain::Field(x));
    rt.launch(&k).unwrap();
    assert_eq!(rt.get(count, 0).unwrap(), 5.0);
}

#[test]
fn test_single_kernel_runs_once() {
    let mut rt = Runtime::new(Arch::Cpu);
    let c = rt.vector("c", 3, true).unwrap();
    rt.copy_from_slice(c, &[1.0, 2.0, 3.0]).unwrap();
    let loss = rt.scalar("loss", true);
    let k = Kernel::single("dot", move |s| {
        let mut acc = s.constant(0.0);
        for j in 0..3 {
            acc = acc + s.load(c, j) * (j as f32);
        }
        s.atomic_add(loss, 0, acc);
    });
    rt.tape(loss, |rt| rt.launch(&k)).unwrap();
    assert_eq!(rt.get(loss, 0).unwrap(), 8.0);
    assert_eq!(rt.grad_to_vec(c).unwrap(), vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_scalar_on_either_side() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 1, true).unwrap();
    let out = rt.scalar("out", true);
    rt.set(x, 0, 4.0).unwrap();
    // (10 - x) / 2 + 1 / x - (-x)
    let k = Kernel::single("mixed", move |s| {
        let v = s.load(x, 0);
        s.atomic_add(out, 0, (10.0 - v) / 2.0 + 1.0 / v - (-v));
    });
    rt.tape(out, |rt| rt.launch(&k)).unwrap();
    assert_eq!(rt.get(out, 0).unwrap(), 3.0 + 0.25 + 4.0);
    // -1/2 - 1/x^2 + 1
    assert_eq!(rt.grad(x, 0).unwrap(), -0.5 - 1.0 / 16.0 + 1.0);
}

#[test]
fn test_gradients_match_finite_differences() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut rt = Runtime::new(Arch::Cpu);
    let x = random_vector(&mut rt, "x", 8, &mut rng);
    let w = random_vector(&mut rt, "w", 8, &mut rng);
    let loss = rt.scalar("loss", true);
    let k = Kernel::over("smooth", x, move |s, i| {
        let v = s.load(x, i);
        let a = s.load(w, i);
        let shifted = v * v + 2.0;
        s.atomic_add(loss, 0, (a * v).tanh() + shifted.sqrt() * shifted.ln() + a.cos() * v.exp());
    });

    let report = check_gradients(&mut rt, loss, x, &[k.clone()], 1e-2).unwrap();
    assert!(report.passed(1e-2), "{report:?}");
    let report = check_gradients(&mut rt, loss, w, &[k], 1e-2).unwrap();
    assert!(report.passed(1e-2), "{report:?}");
}

#[test]
fn test_gradcheck_restores_parameters() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 3, true).unwrap();
    let loss = rt.scalar("loss", true);
    rt.copy_from_slice(x, &[0.5, -1.5, 2.0]).unwrap();
    let k = Kernel::over("cube", x, move |s, i| s.atomic_add(loss, 0, s.load(x, i).powi(3)));
    let report = check_gradients(&mut rt, loss, x, &[k], 1e-2).unwrap();
    assert_eq!(rt.to_vec(x).unwrap(), vec![0.5, -1.5, 2.0]);
    assert_eq!(report.analytic, vec![0.75, 6.75, 12.0]);
    assert!(report.passed(1e-2), "{report:?}");
}

#[test]
fn test_default_arch_round_trip() {
    let before = default_arch();
    set_default_arch(Arch::Serial);
    assert_eq!(Runtime::default().arch(), Arch::Serial);
    set_default_arch(before);
}
