//! End-to-end scenarios for a small order/stock domain built on top of
//! `procrepo`, exercising the process lifecycle the way an application
//! would: business logic only ever sees `Repository`/`Process`, never the
//! bucket internals.

use std::sync::Arc;

use procrepo::entity::Aggregate;
use procrepo::memory::{MemoryMutexes, MemoryStore};
use procrepo::{Process, Repository, RunError, TypeRegistry};

#[derive(Clone, PartialEq, Debug)]
struct ProductStock {
    product_id: u64,
    quantity: i64,
}

impl Aggregate for ProductStock {
    type Id = u64;
}

#[derive(Clone, PartialEq, Debug)]
struct OrderItem {
    product_id: u64,
    quantity: i64,
}

#[derive(Clone, PartialEq, Debug)]
struct Order {
    id: u64,
    items: Vec<OrderItem>,
}

impl Aggregate for Order {
    type Id = u64;
}

type StockRepo = Repository<ProductStock, MemoryStore<ProductStock>, MemoryMutexes<u64>>;
type OrderRepo = Repository<Order, MemoryStore<Order>, MemoryMutexes<u64>>;

fn new_stock_repo(registry: &TypeRegistry) -> StockRepo {
    Repository::new(registry, MemoryStore::new(), MemoryMutexes::new(), |s: &ProductStock| s.product_id).unwrap()
}

fn new_order_repo(registry: &TypeRegistry) -> OrderRepo {
    Repository::new(registry, MemoryStore::new(), MemoryMutexes::new(), |o: &Order| o.id).unwrap()
}

#[derive(Debug, thiserror::Error)]
enum PlaceOrderError {
    #[error("insufficient stock for product {product_id}: has {available}, needs {requested}")]
    InsufficientStock {
        product_id: u64,
        available: i64,
        requested: i64,
    },
    #[error(transparent)]
    Repository(#[from] procrepo::RepositoryError),
}

async fn place_order(
    process: &Process,
    stock: &StockRepo,
    orders: &OrderRepo,
    order: Order,
) -> Result<(), PlaceOrderError> {
    for item in &order.items {
        let handle = stock
            .take(process, &item.product_id)
            .await?
            .expect("product must exist before an order can reference it");
        let mut current = handle.lock();
        if current.quantity < item.quantity {
            return Err(PlaceOrderError::InsufficientStock {
                product_id: item.product_id,
                available: current.quantity,
                requested: item.quantity,
            });
        }
        current.quantity -= item.quantity;
    }
    orders.put(process, order)?;
    Ok(())
}

// Scenario 1: Put followed by Take+mutate flushes an insert, then an
// update, each visible to the next process.
#[tokio::test]
async fn insert_then_update_round_trip() {
    let registry = TypeRegistry::new();
    let stock = new_stock_repo(&registry);

    let insert = Process::start();
    stock
        .put(&insert, ProductStock { product_id: 1, quantity: 100 })
        .unwrap();
    insert.finish().await.unwrap();

    let check = Process::start();
    assert_eq!(
        stock.find(&check, &1).await.unwrap(),
        Some(ProductStock { product_id: 1, quantity: 100 })
    );

    let update = Process::start();
    let handle = stock.take(&update, &1).await.unwrap().unwrap();
    handle.lock().quantity += 50;
    update.finish().await.unwrap();

    let check = Process::start();
    assert_eq!(
        stock.find(&check, &1).await.unwrap(),
        Some(ProductStock { product_id: 1, quantity: 150 })
    );
}

// Scenario 2: an order that asks for more than is in stock fails inside
// the process body; the process is aborted and no stock is lost.
#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_process() {
    let registry = TypeRegistry::new();
    let stock = Arc::new(new_stock_repo(&registry));
    let orders = Arc::new(new_order_repo(&registry));

    let setup = Process::start();
    stock
        .put(&setup, ProductStock { product_id: 1, quantity: 5 })
        .unwrap();
    setup.finish().await.unwrap();

    let order = Order {
        id: 1,
        items: vec![OrderItem { product_id: 1, quantity: 10 }],
    };

    let result = Process::run({
        let stock = stock.clone();
        let orders = orders.clone();
        move |process| async move { place_order(&process, &stock, &orders, order).await }
    })
    .await;

    assert!(matches!(result, Err(RunError::Inner(PlaceOrderError::InsufficientStock { .. }))));

    let check = Process::start();
    assert_eq!(
        stock.find(&check, &1).await.unwrap(),
        Some(ProductStock { product_id: 1, quantity: 5 })
    );
    assert_eq!(orders.find(&check, &1).await.unwrap(), None);
}

// Scenario 4: two processes race to PutIfAbsent the same id; only the
// first actually persists, the second is handed the winner's value back.
//
// `process_a`'s PutIfAbsent registers and holds the id's lock immediately;
// `process_b` has to run as a real concurrent task so the executor can make
// progress on it while it waits on that lock, rather than spinning forever
// inside a single, non-concurrent test task.
#[tokio::test]
async fn put_if_absent_race_has_exactly_one_winner() {
    let registry = TypeRegistry::new();
    let stock = Arc::new(new_stock_repo(&registry));

    let winner = ProductStock { product_id: 1, quantity: 10 };
    let loser = ProductStock { product_id: 1, quantity: 999 };

    let process_a = Process::start();
    let (handle_a, won_a) = stock.put_if_absent(&process_a, winner.clone()).await.unwrap();
    assert_eq!(handle_a.lock().quantity, 10);

    let task_b = {
        let stock = stock.clone();
        let loser = loser.clone();
        tokio::spawn(async move {
            let process_b = Process::start();
            let (handle_b, won_b) = stock.put_if_absent(&process_b, loser).await.unwrap();
            let quantity = handle_b.lock().quantity;
            process_b.abort().await;
            (won_b, quantity)
        })
    };

    // Let task_b actually start spinning on process_a's still-held lock
    // before releasing it.
    tokio::task::yield_now().await;
    process_a.finish().await.unwrap();

    let (won_b, quantity_b) = task_b.await.unwrap();

    assert!(won_a);
    assert!(!won_b);
    assert_eq!(quantity_b, 10);

    let check = Process::start();
    assert_eq!(stock.find(&check, &1).await.unwrap(), Some(winner));
}

// Scenario 5: Take, Remove, then Put the id again within the same process
// lands back on an update rather than a duplicate insert.
#[tokio::test]
async fn take_remove_put_round_trip_ends_as_an_update() {
    let registry = TypeRegistry::new();
    let stock = new_stock_repo(&registry);

    let setup = Process::start();
    stock
        .put(&setup, ProductStock { product_id: 1, quantity: 7 })
        .unwrap();
    setup.finish().await.unwrap();

    let process = Process::start();
    stock.remove(&process, &1).await.unwrap();
    stock
        .put(&process, ProductStock { product_id: 1, quantity: 42 })
        .unwrap();
    process.finish().await.unwrap();

    let check = Process::start();
    assert_eq!(
        stock.find(&check, &1).await.unwrap(),
        Some(ProductStock { product_id: 1, quantity: 42 })
    );
}

// Scenario 6: a panic inside the process body is converted into an abort,
// releasing locks and leaving the store untouched.
#[tokio::test]
async fn panicking_process_body_aborts_instead_of_poisoning_the_store() {
    let registry = TypeRegistry::new();
    let stock = Arc::new(new_stock_repo(&registry));

    let setup = Process::start();
    stock
        .put(&setup, ProductStock { product_id: 1, quantity: 3 })
        .unwrap();
    setup.finish().await.unwrap();

    let result = Process::run::<_, _, std::convert::Infallible>({
        let stock = stock.clone();
        move |process| async move {
            let handle = stock.take(&process, &1).await.unwrap().unwrap();
            handle.lock().quantity = -1;
            panic!("simulated failure mid-process");
        }
    })
    .await;

    assert!(matches!(result, Err(RunError::Panic(_))));

    let check = Process::start();
    assert_eq!(
        stock.find(&check, &1).await.unwrap(),
        Some(ProductStock { product_id: 1, quantity: 3 })
    );

    // The lock taken before the panic must have been released by the abort,
    // otherwise a fresh process could never take the same id again.
    let retry = Process::start();
    assert!(stock.take(&retry, &1).await.unwrap().is_some());
}
