use super::*;

#[test]
fn test_frame_layout() {
    let frame = Frame::new(3, 2);
    assert_eq!(frame.slot_count(), 5);
    assert_eq!(frame.arg_base(), 3);
    assert_eq!(frame.arg_slot(1), 4);
    for slot in 0..5 {
        assert_eq!(frame.get_type(slot), SlotType::Unknown);
    }
}

#[test]
fn test_frame_write_then_read() {
    let mut frame = Frame::new(4, 0);
    frame.set_int(0, -42);
    frame.set_real(1, 2.5);
    frame.set_bool(2, true);
    frame.set_obj(3, Value::str("hello"));

    assert_eq!(frame.get_type(0), SlotType::Int);
    assert_eq!(frame.get_int(0), -42);
    assert_eq!(frame.get_type(1), SlotType::Real);
    assert_eq!(frame.get_real(1), 2.5);
    assert_eq!(frame.get_type(2), SlotType::Bool);
    assert!(frame.get_bool(2));
    assert_eq!(frame.get_type(3), SlotType::Object);
    assert_eq!(frame.get_obj(3), &Value::str("hello"));

    // retyping a slot overwrites the tag
    frame.set_real(0, 1.0);
    assert_eq!(frame.get_type(0), SlotType::Real);
    assert_eq!(frame.checked_int(0), None);
    assert_eq!(frame.checked_real(0), Some(1.0));
}

#[test]
fn test_frame_clear_releases_object() {
    let class = Class::new("Held");
    let inst = class.instantiate();
    let Value::Instance(handle) = &inst else {
        panic!("instantiate must produce an instance");
    };
    let weak = Arc::downgrade(handle);

    let mut frame = Frame::new(2, 0);
    frame.set_obj(0, inst.clone());
    frame.set_int(1, 9);
    drop(inst);
    assert!(weak.upgrade().is_some());

    frame.clear(0);
    assert_eq!(frame.get_type(0), SlotType::Unknown);
    assert!(frame.get_obj(0).is_nil());
    assert!(weak.upgrade().is_none());

    frame.clear(1);
    assert_eq!(frame.get_int(1), 0);
    assert_eq!(frame.get_real(1), 0.0);
    assert!(!frame.get_bool(1));
}

#[test]
fn test_frame_clear_all_and_set_type() {
    let mut frame = Frame::new(2, 1);
    frame.set_int(0, 1);
    frame.set_obj(2, Value::Int(3));
    frame.set_type(1, SlotType::Bool);
    assert_eq!(frame.get_type(1), SlotType::Bool);
    frame.clear_all();
    for slot in 0..3 {
        assert_eq!(frame.get_type(slot), SlotType::Unknown);
        assert!(frame.load_value(slot).is_nil());
    }
}

#[test]
fn test_bind_args_uses_natural_representation() {
    let mut frame = Frame::new(1, 4);
    frame
        .bind_args(&[Value::Int(7), Value::Real(0.5), Value::Bool(false), Value::str("s")])
        .unwrap();
    assert_eq!(frame.checked_int(1), Some(7));
    assert_eq!(frame.checked_real(2), Some(0.5));
    assert_eq!(frame.checked_bool(3), Some(false));
    assert_eq!(frame.checked_obj(4), Some(&Value::str("s")));
    assert_eq!(frame.collect_args(1, 2), vec![Value::Int(7), Value::Real(0.5)]);

    let err = frame.bind_args(&[Value::Nil]).unwrap_err();
    assert!(err.to_string().contains("expected 4 arguments, got 1"));
}

#[test]
fn test_frame_for_function() {
    let func = virtual_call_fn("m", 2, PicConfig::default());
    let frame = Frame::for_function(&func);
    assert_eq!(frame.local_count(), 4);
    assert_eq!(frame.arg_count(), 0);
}
