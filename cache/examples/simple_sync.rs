use fibre_weakcache::{Compute, Strong, WeakCache};

fn main() {
  let cache = WeakCache::new();

  let session = Strong::new(String::from("alice"));
  println!("Storing ('session', \"alice\") without giving the cache ownership.");
  cache.store("session", &session);

  match cache.load(&"session") {
    Some(value) => println!("Found value for session: {}", value),
    None => println!("Value for session not found."),
  }

  let renamed = cache.compute("session", |current| match current {
    Some(name) => Compute::Update(Strong::new(name.to_uppercase())),
    None => Compute::Cancel,
  });
  println!("After compute: {:?}", renamed);

  println!("\nDropping every owner of the value...");
  drop(session);
  drop(renamed);

  match cache.load(&"session") {
    Some(value) => println!("Found value for session: {}", value),
    None => println!("Value for session not found (its last owner is gone)."),
  }
  println!("Slots left in the cache: {}", cache.len());
}
