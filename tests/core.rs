use tapegrad::backend::Arch;
use tapegrad::error::Error;
use tapegrad::field::Tensor;
use tapegrad::kernel::Kernel;
use tapegrad::optim::GradientDescent;
use tapegrad::runtime::Runtime;

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_zeros_fill_the_shape() {
    let t = Tensor::<f32>::zeros(vec![2, 3]);
    assert_eq!(t.len(), 6);
    assert!(t.data.iter().all(|&v| v == 0.0));
    assert_eq!(Tensor::<f32>::zeros(Vec::<usize>::new()).len(), 1);

    let mut rt = Runtime::new(Arch::Serial);
    let m = rt.field("m", vec![4, 5], true).unwrap();
    assert_eq!(rt.to_vec(m).unwrap().len(), 20);
    assert_eq!(rt.grad_to_vec(m).unwrap().len(), 20);
}

#[test]
fn test_scalar_field_has_one_element() {
    let mut rt = Runtime::new(Arch::Serial);
    let loss = rt.scalar("loss", true);
    let field = rt.field_ref(loss).unwrap();
    assert!(field.is_scalar());
    assert_eq!(field.len(), 1);
    assert_eq!(rt.get(loss, 0).unwrap(), 0.0);
}

#[test]
fn test_empty_field_rejected() {
    let mut rt = Runtime::new(Arch::Serial);
    assert!(matches!(rt.vector("x", 0, false), Err(Error::EmptyField(_))));
}

#[test]
fn test_copy_from_slice_checks_length() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 3, false).unwrap();
    let err = rt.copy_from_slice(x, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { got: 2, expected: 3, .. }));
}

#[test]
fn test_accessors_are_bounds_checked() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 2, false).unwrap();
    assert!(matches!(rt.get(x, 2), Err(Error::IndexOutOfRange { .. })));
    assert!(matches!(rt.set(x, 9, 1.0), Err(Error::IndexOutOfRange { .. })));
    assert!(matches!(rt.grad(x, 0), Err(Error::MissingGrad(_))));
    assert!(matches!(rt.set_grad(x, 0, 1.0), Err(Error::MissingGrad(_))));
}

#[test]
fn test_tape_sum_of_squares() {
    let mut rt = Runtime::new(Arch::Cpu);
    let x = rt.vector("x", 3, true).unwrap();
    let y = rt.vector("y", 3, false).unwrap();
    let loss = rt.scalar("loss", true);
    rt.copy_from_slice(x, &[1.0, 2.0, 3.0]).unwrap();
    rt.copy_from_slice(y, &[0.0, 4.0, 3.0]).unwrap();

    let kernel = Kernel::range("compute_loss", 3, move |s, i| {
        let d = s.load(x, i) - s.load(y, i);
        s.atomic_add(loss, 0, 0.5 * d.powi(2));
    });
    rt.tape(loss, |rt| rt.launch(&kernel)).unwrap();

    assert_eq!(rt.get(loss, 0).unwrap(), 2.5);
    assert_eq!(rt.grad_to_vec(x).unwrap(), vec![1.0, -2.0, 0.0]);
    assert_eq!(rt.grad(loss, 0).unwrap(), 1.0);
}

#[test]
fn test_tape_resets_loss_and_gradients() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 2, true).unwrap();
    let loss = rt.scalar("loss", true);
    rt.copy_from_slice(x, &[1.0, 1.0]).unwrap();
    let kernel = Kernel::over("sum", x, move |s, i| s.atomic_add(loss, 0, s.load(x, i)));

    rt.tape(loss, |rt| rt.launch(&kernel)).unwrap();
    rt.tape(loss, |rt| rt.launch(&kernel)).unwrap();

    assert_eq!(rt.get(loss, 0).unwrap(), 2.0);
    assert_eq!(rt.grad_to_vec(x).unwrap(), vec![1.0, 1.0]);
}

#[test]
fn test_tape_replays_kernels_in_reverse() {
    // h = 2x, loss = sum h^2  =>  dloss/dx = 8x
    let mut rt = Runtime::new(Arch::Cpu);
    let x = rt.vector("x", 3, true).unwrap();
    let h = rt.vector("h", 3, true).unwrap();
    let loss = rt.scalar("loss", true);
    rt.copy_from_slice(x, &[1.0, -1.0, 0.5]).unwrap();

    let double = Kernel::over("double", x, move |s, i| s.store(h, i, s.load(x, i) * 2.0));
    let square = Kernel::over("square", h, move |s, i| {
        s.atomic_add(loss, 0, s.load(h, i).powi(2))
    });
    rt.tape(loss, |rt| {
        rt.launch(&double)?;
        rt.launch(&square)
    })
    .unwrap();

    assert_eq!(rt.get(loss, 0).unwrap(), 4.0 + 4.0 + 1.0);
    assert_eq!(rt.grad_to_vec(h).unwrap(), vec![4.0, -4.0, 2.0]);
    assert_eq!(rt.grad_to_vec(x).unwrap(), vec![8.0, -8.0, 4.0]);
}

#[test]
fn test_manual_gradients_match_tape() {
    let build = || {
        let mut rt = Runtime::new(Arch::Serial);
        let x = rt.vector("x", 4, true).unwrap();
        let c = rt.vector("c", 2, true).unwrap();
        let loss = rt.scalar("loss", true);
        rt.copy_from_slice(x, &[-1.0, 0.0, 0.5, 2.0]).unwrap();
        rt.copy_from_slice(c, &[0.3, -0.7]).unwrap();
        let k = Kernel::over("fit", x, move |s, i| {
            let v = s.load(x, i);
            let est = s.load(c, 0) + s.load(c, 1) * v;
            s.atomic_add(loss, 0, 0.5 * (v.sin() - est).powi(2));
        });
        (rt, c, loss, k)
    };

    let (mut taped, c, loss, k) = build();
    taped.tape(loss, |rt| rt.launch(&k)).unwrap();

    let (mut manual, _, _, k2) = build();
    manual.clear_all_gradients();
    manual.set(loss, 0, 0.0).unwrap();
    manual.set_grad(loss, 0, 1.0).unwrap();
    manual.launch(&k2).unwrap();
    manual.launch_grad(&k2).unwrap();

    assert_eq!(taped.get(loss, 0).unwrap(), manual.get(loss, 0).unwrap());
    assert_eq!(taped.grad_to_vec(c).unwrap(), manual.grad_to_vec(c).unwrap());
}

#[test]
fn test_invalid_loss_rejected() {
    let mut rt = Runtime::new(Arch::Serial);
    let v = rt.vector("v", 2, true).unwrap();
    let no_grad = rt.scalar("l", false);
    assert!(matches!(rt.tape(v, |_| Ok(())), Err(Error::InvalidLoss(_))));
    assert!(matches!(rt.tape(no_grad, |_| Ok(())), Err(Error::InvalidLoss(_))));
}

#[test]
fn test_nested_tape_rejected() {
    let mut rt = Runtime::new(Arch::Serial);
    let loss = rt.scalar("loss", true);
    let result = rt.tape(loss, |rt| rt.tape(loss, |_| Ok(())));
    assert!(matches!(result, Err(Error::TapeActive)));
    // the failed tape is discarded, so a new one can start
    assert!(rt.tape(loss, |_| Ok(())).is_ok());
}

#[test]
fn test_gradient_descent_step() {
    let mut rt = Runtime::new(Arch::Cpu);
    let w = rt.vector("w", 2, true).unwrap();
    rt.copy_from_slice(w, &[1.0, 2.0]).unwrap();
    rt.set_grad(w, 0, 0.1).unwrap();
    rt.set_grad(w, 1, 0.2).unwrap();

    GradientDescent::new(0.5).step(&mut rt, w).unwrap();

    assert_eq!(rt.to_vec(w).unwrap(), vec![0.95, 1.9]);
    // gradients are left for the next tape to clear
    assert_eq!(rt.grad_to_vec(w).unwrap(), vec![0.1, 0.2]);
}

#[test]
fn test_gradient_descent_requires_grad() {
    let mut rt = Runtime::new(Arch::Serial);
    let w = rt.vector("w", 2, false).unwrap();
    let err = GradientDescent::new(0.1).step(&mut rt, w).unwrap_err();
    assert!(matches!(err, Error::MissingGrad(_)));
}

#[test]
fn test_launch_count() {
    let mut rt = Runtime::new(Arch::Serial);
    let x = rt.vector("x", 2, true).unwrap();
    let loss = rt.scalar("loss", true);
    let k = Kernel::over("sum", x, move |s, i| s.atomic_add(loss, 0, s.load(x, i)));
    rt.tape(loss, |rt| rt.launch(&k)).unwrap();
    assert_eq!(rt.launch_count(), 2);
}
