//! Pixel-surface tests: whole-channel vector operations and element
//! stores routed through the pixel opcodes rather than flat memory.

use filament_compiler::{BinOp, Builder, IndexKey};
use filament_vm::{DataEntry, PixelChannel, ValueType, Vm, VmConfig};

fn run(builder: &mut Builder) -> (Vm, Vec<DataEntry>) {
    let data = builder.allocate();
    let code = builder.generate_instructions().unwrap();
    let mut vm = Vm::with_config(
        code,
        data.clone(),
        VmConfig {
            seed: Some(1),
            ..VmConfig::default()
        },
    );
    vm.run_once().unwrap();
    (vm, data)
}

#[test]
fn test_vector_assign_fills_channel() {
    let mut b = Builder::new();
    b.func("loop", 1);
    let hue = b.get_obj_var("pixels", "hue", 1).unwrap();
    let level = b.add_const(100, ValueType::I32, 1);
    b.assign(hue, level, 2).unwrap();
    let zero = b.zero();
    b.ret(zero, 3);

    let (vm, _) = run(&mut b);
    assert!(vm
        .pixels()
        .channel(PixelChannel::Hue)
        .iter()
        .all(|&v| v == 100));
}

#[test]
fn test_vector_op_applies_fixed_point_operand() {
    let mut b = Builder::new();
    b.func("loop", 1);
    let hue = b.get_obj_var("pixels", "hue", 1).unwrap();
    let step = b.add_const_f16(0.5, 1);
    b.augassign(BinOp::Add, hue, step, 2).unwrap();
    let zero = b.zero();
    b.ret(zero, 3);

    let (vm, _) = run(&mut b);
    // 0.5 converts to the pixel domain as its raw encoding.
    assert!(vm
        .pixels()
        .channel(PixelChannel::Hue)
        .iter()
        .all(|&v| v == 32768));
}

#[test]
fn test_pixel_element_store() {
    let mut b = Builder::new();
    b.func("loop", 1);
    let sat = b.get_obj_var("pixels", "sat", 1).unwrap();
    let three = b.add_const(3, ValueType::I32, 1);
    let level = b.add_const(200, ValueType::I32, 1);
    b.lookup_subscript(sat, IndexKey::Value(three), 2).unwrap();
    let elem = b.resolve_lookup(2).unwrap();
    b.assign(elem, level, 2).unwrap();
    let zero = b.zero();
    b.ret(zero, 3);

    let (vm, _) = run(&mut b);
    let channel = vm.pixels().channel(PixelChannel::Sat);
    assert_eq!(channel[3], 200);
    assert_eq!(channel.iter().filter(|&&v| v != 0).count(), 1);
}

#[test]
fn test_pixel_store_runtime_index() {
    // The element comes from a variable computed at runtime.
    let mut b = Builder::new();
    let which = b.add_global("which", "i32", &[], 1).unwrap();
    b.func("loop", 2);
    let one = b.add_const(1, ValueType::I32, 2);
    b.augassign(BinOp::Add, which, one, 2).unwrap();
    let val = b.get_obj_var("pixels", "val", 3).unwrap();
    let bright = b.add_const(50, ValueType::I32, 3);
    b.lookup_subscript(val, IndexKey::Value(which), 3).unwrap();
    let elem = b.resolve_lookup(3).unwrap();
    b.assign(elem, bright, 3).unwrap();
    let zero = b.zero();
    b.ret(zero, 4);

    let (vm, _) = run(&mut b);
    assert_eq!(vm.pixels().channel(PixelChannel::Val)[1], 50);
}

#[test]
fn test_channel_selected_by_subscript_field() {
    // pixels["v_fade"][0] = 8, with the channel picked by a field key.
    let mut b = Builder::new();
    b.func("loop", 1);
    let pixels = b.get_var("pixels", 1).unwrap();
    let rate = b.add_const(8, ValueType::I32, 1);
    b.lookup_subscript(pixels, IndexKey::Field("v_fade".into()), 1)
        .unwrap();
    let idx = b.add_const(0, ValueType::I32, 1);
    b.lookup_subscript(pixels, IndexKey::Value(idx), 1).unwrap();
    let elem = b.resolve_lookup(1).unwrap();
    b.assign(elem, rate, 2).unwrap();
    let zero = b.zero();
    b.ret(zero, 3);

    let (vm, _) = run(&mut b);
    assert_eq!(vm.pixels().channel(PixelChannel::VFade)[0], 8);
}

#[test]
fn test_geometry_channel_vector_assign() {
    // Scalar attributes still route through the pixel opcodes.
    let mut b = Builder::new();
    b.func("loop", 1);
    let fade = b.get_obj_var("pixels", "hs_fade", 1).unwrap();
    let rate = b.add_const(1000, ValueType::I32, 1);
    b.assign(fade, rate, 2).unwrap();
    let zero = b.zero();
    b.ret(zero, 3);

    let (vm, _) = run(&mut b);
    assert!(vm
        .pixels()
        .channel(PixelChannel::HsFade)
        .iter()
        .all(|&v| v == 1000));
}
