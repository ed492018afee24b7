use rayon::prelude::*;

pub fn par_iter_reduce1<
    T1: Send + Sync,
    F: Fn(usize, &T1) -> X + Send + Sync,
    X: Send,
    C: Fn(X, X) -> X + Send + Sync,
    I: Fn() -> X + Send + Sync,
>(
    arr1: &[T1],
    identity: I,
    combine: C,
    f: F,
) -> X {
    arr1.par_iter()
        .enumerate()
        .map(|(i, a)| f(i, a))
        .reduce(identity, combine)
}

pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
    arr1.par_iter_mut().enumerate().for_each(|(idx, v1)| {
        f(idx, v1);
    });
}

pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
    arr1: &mut [T1],
    arr2: &mut [T2],
    f: F,
) {
    assert_eq!(arr1.len(), arr2.len());
    arr1.par_iter_mut()
        .zip(arr2.par_iter_mut())
        .enumerate()
        .for_each(|(idx, (v1, v2))| {
            f(idx, v1, v2);
        });
}

#[test]
fn parallel_passes_write_every_slot_once() {
    let mut a = vec![0usize; 1000];
    let mut b = vec![0usize; 1000];
    par_iter_mut1(&mut a, |i, v| *v = i * 2);
    par_iter_mut2(&mut a, &mut b, |i, va, vb| {
        *vb = *va + i;
        *va += 1;
    });
    assert!(b.iter().enumerate().all(|(i, &v)| v == 3 * i));
    let sum = par_iter_reduce1(&a, || 0usize, |x, y| x + y, |_, &v| v);
    assert_eq!(sum, (0..1000).map(|i| i * 2 + 1).sum::<usize>());
}
