use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use scholaris_auth::{
    BaseRole, Identity, PriorSelection, ResolvedSession, RoleSet, Route, RouteTable, SchoolRef,
    SelectionState, Step, authorize, navigate, plan, settle_accounts,
};
use scholaris_core::{IdentityId, SchoolId};

fn identity_with_schools(count: usize) -> Identity {
    let mut identity = Identity::new(IdentityId::new(), BaseRole::Teacher, "t@school.org", "T");
    for i in 0..count {
        identity = identity.with_school(SchoolRef::new(
            SchoolId::new(),
            format!("School {i}"),
            format!("S{i:03}"),
        ));
    }
    identity
}

fn bench_authorize(c: &mut Criterion) {
    let identity = identity_with_schools(1);
    let school = identity.schools[0].clone();
    let session = ResolvedSession::for_school(identity, school, None).unwrap();
    let admins = RoleSet::of(&[BaseRole::Admin, BaseRole::Superadmin]);

    c.bench_function("authorize/forbidden", |b| {
        b.iter(|| authorize(black_box(Some(&session)), black_box(Some(&admins))))
    });
}

fn bench_navigate(c: &mut Criterion) {
    let mut table = RouteTable::new();
    for i in 0..64 {
        table = table.with(Route::for_roles(
            format!("/module{i}"),
            RoleSet::of(&[BaseRole::Teacher]),
        ));
    }
    let identity = identity_with_schools(1);
    let school = identity.schools[0].clone();
    let state =
        SelectionState::Resolved(ResolvedSession::for_school(identity, school, None).unwrap());

    c.bench_function("navigate/64_routes", |b| {
        b.iter(|| navigate(black_box(&state), black_box(&table), black_box("/module63/detail")))
    });
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve/pure_steps");
    for schools in [1usize, 8, 64] {
        let identity = identity_with_schools(schools);
        let prior = PriorSelection::school(identity.schools[schools - 1].id);
        let accounts: Vec<Identity> = (0..4)
            .map(|i| {
                let mut p = Identity::new(
                    IdentityId::new(),
                    BaseRole::Teacher,
                    "t@school.org",
                    format!("T{i}"),
                );
                p.schools = identity.schools.clone();
                p
            })
            .collect();
        let pick = accounts[2].id;

        group.bench_with_input(BenchmarkId::from_parameter(schools), &schools, |b, _| {
            b.iter(|| {
                let Ok(Step::FetchAccounts { school }) = plan(&identity, &prior) else {
                    unreachable!("prior school is always a member");
                };
                settle_accounts(&identity, school, accounts.clone(), Some(pick))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_authorize, bench_navigate, bench_resolution);
criterion_main!(benches);
