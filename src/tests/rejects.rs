use crate::dex::code::{CodeItem, MethodDef};
use crate::dex::pool::ConstantPool;
use crate::verify::verify_method;

fn pool() -> ConstantPool {
    ConstantPool::new(2, 2, 2).with_types(&["Ljava/lang/String;", "[I"])
}

fn method(registers: u16, insns: Vec<u16>) -> MethodDef {
    MethodDef::new("m", 0, Some(CodeItem::new(registers, 0, insns)))
}

/// sparse-switch v0 at 0 with its payload at 4; both cases jump to the return at 3.
fn sparse_switch(keys: [u32; 2]) -> Vec<u16> {
    let mut insns = vec![0x002c, 0x0004, 0x0000, 0x000e, 0x0200, 0x0002];
    for key in keys {
        insns.extend([key as u16, (key >> 16) as u16]);
    }
    insns.extend([0x0003, 0x0000, 0x0003, 0x0000]);
    insns
}

#[test]
fn new_instance_of_array_type() {
    // new-instance v0, type@1; return-void
    let e = verify_method(&method(1, vec![0x0022, 0x0001, 0x000e]), &pool()).unwrap_err();
    assert_eq!(e.message(), "Can't call new-instance on type '[I'");
    assert_eq!(e.contexts(), ["opcode 0x22 at 0x0000", "method m"]);

    assert!(verify_method(&method(1, vec![0x0022, 0x0000, 0x000e]), &pool()).is_ok());
}

#[test]
fn sparse_switch_keys_must_ascend() {
    let verified = verify_method(&method(1, sparse_switch([3, 5])), &pool()).expect("ascending");
    assert_eq!(verified.blocks.predecessors(3), vec![0]);

    let e = verify_method(&method(1, sparse_switch([5, 3])), &pool()).unwrap_err();
    assert_eq!(e.message(), "Invalid sparse switch: last key=5, this=3");
    assert_eq!(e.contexts()[0], "opcode 0x2c at 0x0000");

    let e = verify_method(&method(1, sparse_switch([4, 4])), &pool()).unwrap_err();
    assert!(e.message().starts_with("Invalid sparse switch"));
}

#[test]
fn branch_one_past_the_end() {
    // const/4 v0; goto +2; return-void
    let e = verify_method(&method(1, vec![0x0012, 0x0228, 0x000e]), &pool()).unwrap_err();
    assert!(e.message().starts_with("Invalid branch target"), "{}", e);
    assert_eq!(e.contexts()[0], "opcode 0x28 at 0x0001");

    // goto +1 lands on the return
    assert!(verify_method(&method(1, vec![0x0012, 0x0128, 0x000e]), &pool()).is_ok());
}

#[test]
fn wide_register_pair_must_fit() {
    // const-wide/16 v1, #0 needs v1 and v2
    let e = verify_method(&method(2, vec![0x0116, 0x0000, 0x000e]), &pool()).unwrap_err();
    assert!(e.message().starts_with("Wide register index out of range"), "{}", e);
    assert!(verify_method(&method(3, vec![0x0116, 0x0000, 0x000e]), &pool()).is_ok());
}

#[test]
fn falling_off_the_end() {
    // const/4 v0 with nothing after it
    let e = verify_method(&method(1, vec![0x0012]), &pool()).unwrap_err();
    assert!(e.message().contains("walk off end of code"), "{}", e);
}
